//! Remote image (WMS) routes.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::ApiResult;
use crate::api::models::JobSubmitResponse;
use crate::api::server::AppState;
use crate::pipeline::{JobRequest, RemoteImageParams};

/// Create the remote image router.
pub fn router() -> Router<AppState> {
    Router::new().route("/wms", post(fetch_wms))
}

/// Fetch a WMS map, georeference it to its bbox and reproject the result.
async fn fetch_wms(
    State(state): State<AppState>,
    Json(params): Json<RemoteImageParams>,
) -> ApiResult<Json<JobSubmitResponse>> {
    let record = state
        .executor
        .submit(JobRequest::RemoteImage(params), None)
        .await?;
    Ok(Json(JobSubmitResponse::from(&record)))
}
