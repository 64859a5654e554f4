//! Raster and vector inspection routes.
//!
//! The report is returned inline and also kept as the job's output.

use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::post,
};
use tracing::warn;

use crate::api::error::ApiResult;
use crate::api::models::InspectionResponse;
use crate::api::server::AppState;
use crate::api::upload::read_upload_form;
use crate::pipeline::{JobRequest, JobStatus};

/// Create the inspection router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/raster", post(inspect_raster))
        .route("/vector", post(inspect_vector))
}

async fn inspect_raster(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<InspectionResponse>> {
    inspect(state, multipart, JobRequest::RasterInfo).await
}

async fn inspect_vector(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<InspectionResponse>> {
    inspect(state, multipart, JobRequest::VectorInfo).await
}

async fn inspect(
    state: AppState,
    multipart: Multipart,
    request: JobRequest,
) -> ApiResult<Json<InspectionResponse>> {
    let form = read_upload_form(multipart).await?;
    let filename = form.file_name();

    let record = state.executor.submit(request, Some(form.upload)).await?;

    let report = if record.status == JobStatus::Success {
        match state.gateway.download(record.job_id).await {
            Ok(download) => Some(String::from_utf8_lossy(&download.bytes).into_owned()),
            Err(e) => {
                warn!(job_id = %record.job_id, error = %e, "Inspection report unavailable");
                None
            }
        }
    } else {
        None
    };

    Ok(Json(InspectionResponse {
        job_id: record.job_id.to_string(),
        status: record.status.to_string(),
        filename,
        report,
        error: record.error_detail,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::test_support::{TestApp, body_json, multipart_request};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_inspect_raster_returns_report() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/inspect/raster",
                Some(("dem.tif", b"raster")),
                &[],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["filename"], "dem.tif");
        assert_eq!(json["report"], "raster-info report");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_inspect_vector_returns_report() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/inspect/vector",
                Some(("roads.geojson", b"{}")),
                &[],
            ))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["report"], "vector-info report");
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected_without_a_job() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request("/api/inspect/raster", None, &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.state.executor.registry().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/inspect/raster",
                Some(("empty.tif", b"")),
                &[],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.state.executor.registry().is_empty());
    }
}
