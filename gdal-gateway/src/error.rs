//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::transform::TransformFailure;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Upload could not be read or persisted.
    #[error("Intake error: {0}")]
    Intake(String),

    #[error(transparent)]
    Transform(#[from] TransformFailure),

    #[error("Invalid state transition for job {job_id}: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Job {job_id} is not ready (status: {status})")]
    NotReady { job_id: String, status: String },

    #[error("Artifact {artifact} of job {job_id} has been reclaimed")]
    ArtifactGone { job_id: String, artifact: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn intake(msg: impl Into<String>) -> Self {
        Self::Intake(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this is a "missing entity" error (artifact or job).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("Job", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Entity not found: Job with id abc");
    }

    #[test]
    fn test_io_path_message_includes_path() {
        let err = Error::io_path(
            "reading artifact",
            Path::new("/tmp/store/x.tif"),
            std::io::Error::other("boom"),
        );
        let msg = err.to_string();
        assert!(msg.contains("reading artifact"));
        assert!(msg.contains("/tmp/store/x.tif"));
    }
}
