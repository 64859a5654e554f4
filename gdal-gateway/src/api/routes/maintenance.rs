//! Maintenance routes.

use std::time::Duration;

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::ApiResult;
use crate::api::models::{SweepRequest, SweepResponse};
use crate::api::server::AppState;

/// Create the maintenance router.
pub fn router() -> Router<AppState> {
    Router::new().route("/sweep", post(sweep))
}

/// Run a sweep now. The body is optional; without `max_age_secs` the
/// configured retention applies.
async fn sweep(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> ApiResult<Json<SweepResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let max_age_secs = request
        .max_age_secs
        .unwrap_or(state.sweeper.config().retention_secs);

    let report = state.sweeper.sweep(Duration::from_secs(max_age_secs)).await?;
    Ok(Json(SweepResponse::new(report, max_age_secs)))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::test_support::{TestApp, body_json};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_sweep_without_body_uses_configured_retention() {
        let app = TestApp::new();
        app.state.executor.store().put(b"fresh").await.unwrap();

        let response = app
            .router()
            .oneshot(
                Request::post("/api/maintenance/sweep")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["removed"], 0);
        assert_eq!(json["max_age_secs"], 3600);
    }

    #[tokio::test]
    async fn test_sweep_with_max_age() {
        let app = TestApp::new();
        let artifact = app.state.executor.store().put(b"old").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let response = app
            .router()
            .oneshot(
                Request::post("/api/maintenance/sweep")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"max_age_secs": 0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["removed"], 1);
        assert!(!app.state.executor.store().exists(&artifact).await);
    }
}
