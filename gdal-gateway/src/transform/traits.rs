//! Transform trait and related types.

use async_trait::async_trait;

use super::failure::TransformFailure;
use super::request::{TransformKind, TransformOutput, TransformRequest};
use crate::store::ArtifactStore;

/// What a transform may touch while it runs.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Store to read inputs from and write outputs into.
    pub store: ArtifactStore,
    /// Job the step belongs to, for log correlation.
    pub job_id: String,
}

impl TransformContext {
    pub fn new(store: ArtifactStore, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
        }
    }
}

/// One transform capability (one implementation per [`TransformKind`]).
#[async_trait]
pub trait Transform: Send + Sync {
    /// The kind of request this transform handles.
    fn kind(&self) -> TransformKind;

    /// Get the transform name.
    fn name(&self) -> &'static str;

    /// Run the transform.
    ///
    /// Producing transforms write a fresh artifact and return its key; they
    /// must not leave a partial output behind when they fail.
    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure>;
}

/// Failure for a request routed to the wrong implementation.
pub(crate) fn unexpected_request(expected: TransformKind, got: &TransformRequest) -> TransformFailure {
    TransformFailure::invalid_input(
        expected,
        format!("cannot handle a {} request", got.kind()),
    )
}
