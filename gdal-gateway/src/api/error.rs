//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::transform::FailureReason;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Job exists but has no downloadable output.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "NOT_READY", message)
    }

    /// Output existed but has been reclaimed.
    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, "ARTIFACT_GONE", message)
    }

    /// Create a 409 Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Create a 422 Unprocessable Entity error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Create a 503 Service Unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => {
                ApiError::not_found(format!("{} with id '{}' not found", entity_type, id))
            }
            Error::NotReady { job_id, status } => ApiError::not_ready(format!(
                "Job {} has no output (status: {})",
                job_id, status
            ))
            .with_details(serde_json::json!({ "status": status })),
            Error::ArtifactGone { job_id, artifact } => ApiError::gone(format!(
                "Output of job {} has been removed by retention",
                job_id
            ))
            .with_details(serde_json::json!({ "artifact": artifact })),
            Error::Intake(msg) => ApiError::bad_request(msg),
            Error::Validation(msg) => ApiError::validation(msg),
            Error::Configuration(msg) => ApiError::bad_request(msg),
            Error::Transform(failure) if failure.reason == FailureReason::InvalidInput => {
                ApiError::validation(failure.to_string())
            }
            Error::InvalidStateTransition { job_id, from, to } => ApiError::conflict(format!(
                "Job {}: cannot transition from {} to {}",
                job_id, from, to
            )),
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                ApiError::internal("IO error occurred")
            }
            Error::ApiError(msg) => ApiError::bad_request(msg),
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{TransformFailure, TransformKind};

    #[test]
    fn test_api_error_creation() {
        let err = ApiError::not_found("Job not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "Job not found");
    }

    #[test]
    fn test_retrieval_errors_are_distinct() {
        let not_found = ApiError::from(Error::not_found("Job", "x"));
        let not_ready = ApiError::from(Error::NotReady {
            job_id: "x".into(),
            status: "failed".into(),
        });
        let gone = ApiError::from(Error::ArtifactGone {
            job_id: "x".into(),
            artifact: "a.tif".into(),
        });

        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_ready.status, StatusCode::BAD_REQUEST);
        assert_eq!(not_ready.code, "NOT_READY");
        assert_eq!(gone.status, StatusCode::GONE);
        assert_eq!(gone.code, "ARTIFACT_GONE");
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let err = ApiError::from(Error::InvalidStateTransition {
            job_id: "x".into(),
            from: "success".into(),
            to: "failed".into(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_transform_errors() {
        let invalid = ApiError::from(Error::Transform(TransformFailure::invalid_input(
            TransformKind::Reproject,
            "bad srs",
        )));
        assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);

        let network = ApiError::from(Error::Transform(TransformFailure::network(
            TransformKind::FetchRemoteImage,
            "refused",
        )));
        assert_eq!(network.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_intake_is_bad_request() {
        let err = ApiError::from(Error::intake("missing file"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
