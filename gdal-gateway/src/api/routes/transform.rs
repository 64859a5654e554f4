//! Format conversion, reprojection and vectorization routes.

use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::post,
};

use crate::api::error::ApiResult;
use crate::api::models::JobSubmitResponse;
use crate::api::server::AppState;
use crate::api::upload::{UploadForm, read_upload_form};
use crate::pipeline::{
    DEFAULT_CONVERT_FORMAT, DEFAULT_REPROJECT_SRS, DEFAULT_VECTORIZE_FORMAT, JobRequest,
};

/// Create the transform router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/convert", post(convert))
        .route("/reproject", post(reproject))
        .route("/vectorize", post(vectorize))
}

/// Convert a raster to `output_format` (default GTiff).
async fn convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<JobSubmitResponse>> {
    let form = read_upload_form(multipart).await?;
    let request = JobRequest::Convert {
        output_format: field_or(&form, "output_format", DEFAULT_CONVERT_FORMAT),
    };
    submit(state, form, request).await
}

/// Reproject a raster to `epsg` (default 4326).
async fn reproject(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<JobSubmitResponse>> {
    let form = read_upload_form(multipart).await?;
    let request = JobRequest::Reproject {
        epsg: field_or(&form, "epsg", DEFAULT_REPROJECT_SRS),
    };
    submit(state, form, request).await
}

/// Polygonize a raster into `output_format` (default GeoJSON).
async fn vectorize(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<JobSubmitResponse>> {
    let form = read_upload_form(multipart).await?;
    let request = JobRequest::Vectorize {
        output_format: field_or(&form, "output_format", DEFAULT_VECTORIZE_FORMAT),
    };
    submit(state, form, request).await
}

fn field_or(form: &UploadForm, name: &str, default: &str) -> String {
    form.field(name).unwrap_or(default).to_string()
}

async fn submit(
    state: AppState,
    form: UploadForm,
    request: JobRequest,
) -> ApiResult<Json<JobSubmitResponse>> {
    let record = state.executor.submit(request, Some(form.upload)).await?;
    Ok(Json(JobSubmitResponse::from(&record)))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::test_support::{TestApp, body_json, multipart_request};
    use crate::pipeline::{JobKind, JobStatus};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_convert_succeeds() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/transform/convert",
                Some(("in.tif", b"pixels")),
                &[("output_format", "PNG")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "success");

        let jobs = app.state.executor.registry().list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Convert);
        assert_eq!(jobs[0].source_name.as_deref(), Some("in.tif"));
    }

    #[tokio::test]
    async fn test_reproject_defaults_to_4326() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/transform/reproject",
                Some(("in.tif", b"pixels")),
                &[],
            ))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
    }

    #[tokio::test]
    async fn test_invalid_epsg_fails_the_job() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/transform/reproject",
                Some(("in.tif", b"pixels")),
                &[("epsg", "EPSG:../../etc")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "failed");
        assert!(json["error"].is_string());

        let job = &app.state.executor.registry().list()[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.output_reference.is_none());
    }

    #[tokio::test]
    async fn test_vectorize_succeeds() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/transform/vectorize",
                Some(("in.tif", b"pixels")),
                &[("output_format", "GPKG")],
            ))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
    }
}
