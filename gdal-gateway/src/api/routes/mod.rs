//! API route modules.
//!
//! Organizes routes by resource type.

pub mod health;
pub mod inspect;
pub mod jobs;
pub mod logging;
pub mod maintenance;
pub mod remote;
pub mod transform;

use axum::{Json, Router, routing::get};

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/api/inspect", inspect::router())
        .nest("/api/transform", transform::router())
        .nest("/api/remote", remote::router())
        .nest("/api/jobs", jobs::router())
        .nest("/api/maintenance", maintenance::router())
        .nest("/api/logging", logging::router())
        .nest("/health", health::router())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "GDAL gateway is running" }))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-process app with fake transforms for route tests.

    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header};
    use strum::IntoEnumIterator;
    use tempfile::TempDir;

    use crate::api::server::AppState;
    use crate::pipeline::{
        ExecutorConfig, JobRegistry, PipelineExecutor, RetentionSweeper, RetrievalGateway,
        SweeperConfig,
    };
    use crate::store::ArtifactStore;
    use crate::transform::{
        Transform, TransformContext, TransformFailure, TransformKind, TransformOutput,
        TransformRequest, TransformSet,
    };

    /// Reports for inspections; copies the input with a `|kind` marker otherwise.
    pub struct Marking(pub TransformKind);

    #[async_trait]
    impl Transform for Marking {
        fn kind(&self) -> TransformKind {
            self.0
        }

        fn name(&self) -> &'static str {
            "Marking"
        }

        async fn apply(
            &self,
            request: &TransformRequest,
            ctx: &TransformContext,
        ) -> Result<TransformOutput, TransformFailure> {
            if matches!(self.0, TransformKind::RasterInfo | TransformKind::VectorInfo) {
                return Ok(TransformOutput::Report(format!("{} report", self.0)));
            }
            let mut bytes = match request.input() {
                Some(input) => ctx
                    .store
                    .get(input)
                    .await
                    .map_err(|e| TransformFailure::invalid_input(self.0, e.to_string()))?
                    .to_vec(),
                None => b"remote".to_vec(),
            };
            bytes.extend_from_slice(format!("|{}", self.0).as_bytes());
            let out = ctx
                .store
                .put_with_extension(&bytes, Some("tif"))
                .await
                .map_err(|e| TransformFailure::storage(self.0, e))?;
            Ok(TransformOutput::Artifact(out))
        }
    }

    pub struct TestApp {
        pub dir: TempDir,
        pub state: AppState,
    }

    impl TestApp {
        pub fn new() -> Self {
            let transforms = TransformKind::iter().fold(TransformSet::new(), |set, kind| {
                set.with(Arc::new(Marking(kind)))
            });
            Self::with_transforms(transforms)
        }

        pub fn with_transforms(transforms: TransformSet) -> Self {
            let dir = TempDir::new().unwrap();
            let store = ArtifactStore::open(dir.path()).unwrap();
            let registry = JobRegistry::new();
            let executor = PipelineExecutor::new(
                registry.clone(),
                store.clone(),
                Arc::new(transforms),
                ExecutorConfig::default(),
            );
            let gateway = RetrievalGateway::new(registry, store.clone());
            let sweeper = RetentionSweeper::new(SweeperConfig::default(), store);
            Self {
                dir,
                state: AppState::new(executor, gateway, sweeper),
            }
        }

        pub fn router(&self) -> axum::Router {
            super::create_router(self.state.clone())
        }
    }

    const BOUNDARY: &str = "gateway-test-boundary";

    /// A multipart POST with an optional file part and text fields.
    pub fn multipart_request(
        uri: &str,
        file: Option<(&str, &[u8])>,
        fields: &[(&str, &str)],
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
