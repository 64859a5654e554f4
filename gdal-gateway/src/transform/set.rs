//! Registry dispatching requests to the transform registered for their kind.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::failure::{FailureReason, TransformFailure};
use super::gdal::{
    AssignGeoreferenceTransform, ConvertTransform, GdalTools, RasterInfoTransform,
    ReprojectTransform, VectorInfoTransform, VectorizeTransform,
};
use super::request::{TransformKind, TransformOutput, TransformRequest};
use super::traits::{Transform, TransformContext};
use super::wms::{RemoteFetchConfig, RemoteImageFetcher};

/// The capabilities available to the pipeline, keyed by kind.
#[derive(Default, Clone)]
pub struct TransformSet {
    transforms: HashMap<TransformKind, Arc<dyn Transform>>,
}

impl TransformSet {
    /// An empty set. Every request fails until transforms are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// GDAL command-line tools plus the WMS fetcher.
    pub fn gdal(tools: GdalTools, remote: &RemoteFetchConfig) -> crate::Result<Self> {
        let tools = Arc::new(tools);
        let fetcher = RemoteImageFetcher::new(remote)?;

        Ok(Self::new()
            .with(Arc::new(RasterInfoTransform::new(tools.clone())))
            .with(Arc::new(VectorInfoTransform::new(tools.clone())))
            .with(Arc::new(ConvertTransform::new(tools.clone())))
            .with(Arc::new(ReprojectTransform::new(tools.clone())))
            .with(Arc::new(VectorizeTransform::new(tools.clone())))
            .with(Arc::new(AssignGeoreferenceTransform::new(tools)))
            .with(Arc::new(fetcher)))
    }

    /// Register `transform`, replacing any previous one of the same kind.
    pub fn register(&mut self, transform: Arc<dyn Transform>) {
        if let Some(previous) = self.transforms.insert(transform.kind(), transform.clone()) {
            warn!(
                kind = %transform.kind(),
                replaced = previous.name(),
                with = transform.name(),
                "Replacing registered transform"
            );
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, transform: Arc<dyn Transform>) -> Self {
        self.register(transform);
        self
    }

    pub fn get(&self, kind: TransformKind) -> Option<&Arc<dyn Transform>> {
        self.transforms.get(&kind)
    }

    pub fn supports(&self, kind: TransformKind) -> bool {
        self.transforms.contains_key(&kind)
    }

    /// Dispatch `request` to its transform.
    pub async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> Result<TransformOutput, TransformFailure> {
        let kind = request.kind();
        let transform = self.get(kind).ok_or_else(|| {
            TransformFailure::new(
                kind,
                FailureReason::EngineUnavailable,
                "no transform registered for this kind",
            )
        })?;

        debug!(job_id = %ctx.job_id, kind = %kind, transform = transform.name(), "Dispatching transform");
        transform.apply(request, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArtifactStore;
    use async_trait::async_trait;
    use strum::IntoEnumIterator;
    use tempfile::TempDir;

    struct EchoInfo;

    #[async_trait]
    impl Transform for EchoInfo {
        fn kind(&self) -> TransformKind {
            TransformKind::RasterInfo
        }

        fn name(&self) -> &'static str {
            "EchoInfo"
        }

        async fn apply(
            &self,
            request: &TransformRequest,
            _ctx: &TransformContext,
        ) -> Result<TransformOutput, TransformFailure> {
            Ok(TransformOutput::Report(format!(
                "info for {}",
                request.input().map(|a| a.as_str()).unwrap_or("-")
            )))
        }
    }

    fn ctx() -> (TempDir, TransformContext) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, TransformContext::new(store, "job-1"))
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let (_dir, ctx) = ctx();
        let set = TransformSet::new().with(Arc::new(EchoInfo));
        let input = ctx.store.allocate(Some("tif"));

        let output = set
            .apply(&TransformRequest::RasterInfo { input: input.clone() }, &ctx)
            .await
            .unwrap();
        assert_eq!(output, TransformOutput::Report(format!("info for {input}")));
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_engine_unavailable() {
        let (_dir, ctx) = ctx();
        let set = TransformSet::new().with(Arc::new(EchoInfo));
        let input = ctx.store.allocate(None);

        let failure = set
            .apply(&TransformRequest::VectorInfo { input }, &ctx)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, TransformKind::VectorInfo);
        assert_eq!(failure.reason, FailureReason::EngineUnavailable);
    }

    #[test]
    fn test_gdal_set_covers_every_kind() {
        let set = TransformSet::gdal(GdalTools::default(), &RemoteFetchConfig::default()).unwrap();
        for kind in TransformKind::iter() {
            assert!(set.supports(kind), "missing transform for {kind}");
        }
    }
}
