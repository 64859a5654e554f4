//! Service container for dependency injection.
//!
//! The ServiceContainer wires the artifact store, job registry, transform
//! set, executor, gateway and sweeper together and manages their lifecycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::api::server::AppState;
use crate::config::GatewayConfig;
use crate::logging::LoggingConfig;
use crate::pipeline::{JobRegistry, PipelineExecutor, RetentionSweeper, RetrievalGateway};
use crate::store::ArtifactStore;
use crate::transform::TransformSet;

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Artifact store shared by every component.
    pub store: ArtifactStore,
    /// Job registry.
    pub registry: JobRegistry,
    /// Pipeline executor.
    pub executor: PipelineExecutor,
    /// Status/download gateway.
    pub gateway: RetrievalGateway,
    /// Retention sweeper.
    pub sweeper: RetentionSweeper,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Create a container backed by the GDAL command-line tools.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let transforms = TransformSet::gdal(config.tools.clone(), &config.remote)?;
        Self::with_transforms(config, transforms)
    }

    /// Create a container with a custom transform set.
    pub fn with_transforms(config: &GatewayConfig, transforms: TransformSet) -> Result<Self> {
        info!(store = %config.store_dir.display(), "Initializing service container");

        let store = ArtifactStore::open(&config.store_dir)?;
        let registry = JobRegistry::new();
        let executor = PipelineExecutor::new(
            registry.clone(),
            store.clone(),
            Arc::new(transforms),
            config.executor.clone(),
        );
        let gateway = RetrievalGateway::new(registry.clone(), store.clone());
        let sweeper = RetentionSweeper::new(config.sweeper.clone(), store.clone());

        info!("Service container initialized");

        Ok(Self {
            store,
            registry,
            executor,
            gateway,
            sweeper,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Start background tasks.
    pub fn initialize(&self) {
        self.sweeper
            .start_background_task(self.cancellation_token.child_token());
    }

    /// Application state for the API layer.
    pub fn app_state(&self, logging_config: Option<Arc<LoggingConfig>>) -> AppState {
        let state = AppState::new(
            self.executor.clone(),
            self.gateway.clone(),
            self.sweeper.clone(),
        );
        match logging_config {
            Some(config) => state.with_logging_config(config),
            None => state,
        }
    }

    /// Signal all background tasks to stop.
    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Get service statistics.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            job_count: self.registry.len(),
            max_concurrent_jobs: self.executor.config().max_concurrent_jobs,
            retention_secs: self.sweeper.config().retention_secs,
        }
    }
}

/// Service statistics.
#[derive(Debug, Clone)]
pub struct ServiceStats {
    /// Number of jobs ever submitted.
    pub job_count: usize,
    /// Pipeline concurrency bound.
    pub max_concurrent_jobs: usize,
    /// Artifact retention age.
    pub retention_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> GatewayConfig {
        GatewayConfig {
            store_dir: dir.path().join("store"),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_container_creates_store_dir() {
        let dir = TempDir::new().unwrap();
        let container = ServiceContainer::new(&config(&dir)).unwrap();
        assert!(dir.path().join("store").is_dir());
        assert_eq!(container.stats().job_count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let dir = TempDir::new().unwrap();
        let container = ServiceContainer::with_transforms(&config(&dir), TransformSet::new()).unwrap();
        container.initialize();
        assert!(!container.is_shutting_down());
        container.shutdown();
        assert!(container.cancellation_token().is_cancelled());
    }
}
