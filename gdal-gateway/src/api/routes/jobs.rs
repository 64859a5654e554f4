//! Job status and download routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{JobResponse, PaginatedResponse, PaginationParams};
use crate::api::server::AppState;
use crate::pipeline::JobId;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/download", get(download_job))
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Job with id '{}' not found", raw)))
}

/// List jobs, newest first.
async fn list_jobs(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<JobResponse>>> {
    let limit = pagination.effective_limit();
    let jobs = state.executor.registry().list();
    let total = jobs.len() as u64;

    let items = jobs
        .into_iter()
        .skip(pagination.offset as usize)
        .take(limit as usize)
        .map(JobResponse::from)
        .collect();

    Ok(Json(PaginatedResponse::new(
        items,
        total,
        limit,
        pagination.offset,
    )))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = parse_job_id(&id)?;
    let record = state.gateway.status(job_id)?;
    Ok(Json(JobResponse::from(record)))
}

/// Raw output bytes of a successful job.
async fn download_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&id)?;
    let download = state.gateway.download(job_id).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        download.file_name
    ))
    .map_err(|e| ApiError::internal(format!("Invalid file name: {}", e)))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::routes::test_support::{Marking, TestApp, body_json, multipart_request};
    use crate::transform::{TransformKind, TransformSet};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    async fn submit_convert(app: &TestApp) -> String {
        let response = app
            .router()
            .oneshot(multipart_request(
                "/api/transform/convert",
                Some(("in.tif", b"pixels")),
                &[],
            ))
            .await
            .unwrap();
        body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_status_and_download() {
        let app = TestApp::new();
        let job_id = submit_convert(&app).await;

        let response = app
            .router()
            .oneshot(get(&format!("/api/jobs/{job_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["kind"], "convert");
        assert!(json["output_reference"].is_string());

        let response = app
            .router()
            .oneshot(get(&format!("/api/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("{job_id}.tif")));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"pixels|convert");
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_404() {
        let app = TestApp::new();
        for uri in [
            format!("/api/jobs/{}", uuid::Uuid::new_v4()),
            "/api/jobs/not-a-uuid".to_string(),
            format!("/api/jobs/{}/download", uuid::Uuid::new_v4()),
        ] {
            let response = app.router().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_download_of_failed_job_is_not_ready() {
        // Only inspection is registered, so convert fails.
        let app = TestApp::with_transforms(
            TransformSet::new().with(Arc::new(Marking(TransformKind::RasterInfo))),
        );
        let job_id = submit_convert(&app).await;

        let response = app
            .router()
            .oneshot(get(&format!("/api/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "NOT_READY");
    }

    #[tokio::test]
    async fn test_download_after_reclaim_is_gone() {
        let app = TestApp::new();
        let job_id = submit_convert(&app).await;
        let hour = std::time::Duration::from_secs(3600);
        app.state
            .sweeper
            .sweep_at(hour, std::time::SystemTime::now() + 2 * hour)
            .await
            .unwrap();

        let response = app
            .router()
            .oneshot(get(&format!("/api/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        let json = body_json(response).await;
        assert_eq!(json["code"], "ARTIFACT_GONE");
    }

    #[tokio::test]
    async fn test_list_is_paginated_newest_first() {
        let app = TestApp::new();
        let first = submit_convert(&app).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = submit_convert(&app).await;

        let response = app
            .router()
            .oneshot(get("/api/jobs?limit=1"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
        assert_eq!(json["items"][0]["job_id"], second.as_str());

        let response = app
            .router()
            .oneshot(get("/api/jobs?limit=1&offset=1"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["items"][0]["job_id"], first.as_str());
    }
}
