//! Retention sweeper.
//!
//! Deletes store artifacts older than the retention age, whatever the state
//! of the job that produced them. Job records stay; downloads of a reclaimed
//! output report the artifact as gone.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::ArtifactStore;
use crate::{Error, Result};

/// Configuration for artifact sweeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Artifacts older than this many seconds are removed.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Interval between background sweeps in seconds.
    /// Set to 0 to disable the background task.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_retention_secs() -> u64 {
    3600 // 1 hour
}

fn default_check_interval_secs() -> u64 {
    600
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl SweeperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retention age.
    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    /// Set the check interval.
    pub fn with_check_interval_secs(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Artifacts deleted.
    pub removed: u64,
    /// Artifacts that were expired but could not be deleted.
    pub failed: u64,
}

/// Periodic/triggered reclamation of aged artifacts.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    config: SweeperConfig,
    store: ArtifactStore,
}

impl RetentionSweeper {
    pub fn new(config: SweeperConfig, store: ArtifactStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Sweep with the configured retention age.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        self.sweep(self.config.retention()).await
    }

    /// Delete every artifact older than `max_age`.
    pub async fn sweep(&self, max_age: Duration) -> Result<SweepReport> {
        self.sweep_at(max_age, SystemTime::now()).await
    }

    /// Delete every artifact whose age at `now` exceeds `max_age`.
    pub async fn sweep_at(&self, max_age: Duration, now: SystemTime) -> Result<SweepReport> {
        let store = self.store.clone();
        let report = tokio::task::spawn_blocking(move || sweep_blocking(&store, max_age, now))
            .await
            .map_err(|e| Error::Other(format!("sweep task failed: {e}")))??;

        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                failed = report.failed,
                max_age_secs = max_age.as_secs(),
                "Swept expired artifacts"
            );
        } else {
            debug!("No artifacts to sweep");
        }
        Ok(report)
    }

    /// Start the background sweep task.
    pub fn start_background_task(&self, cancellation_token: CancellationToken) {
        if self.config.check_interval_secs == 0 {
            info!("Retention sweeper disabled (check_interval_secs = 0)");
            return;
        }

        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut check_interval =
                interval(Duration::from_secs(sweeper.config.check_interval_secs));

            info!(
                "Retention sweeper started (retention: {}s, interval: {}s)",
                sweeper.config.retention_secs, sweeper.config.check_interval_secs
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Retention sweeper shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        if let Err(e) = sweeper.run_sweep().await {
                            error!("Sweep cycle failed: {}", e);
                        }
                    }
                }
            }
        });
    }
}

fn sweep_blocking(store: &ArtifactStore, max_age: Duration, now: SystemTime) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    for artifact in store.list_older_than_at(max_age, now)? {
        match store.delete_blocking(&artifact) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(artifact = %artifact, error = %e, "Failed to sweep artifact");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn sweeper() -> (TempDir, RetentionSweeper) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, RetentionSweeper::new(SweeperConfig::default(), store))
    }

    #[test]
    fn test_config_builder() {
        let config = SweeperConfig::new()
            .with_retention_secs(60)
            .with_check_interval_secs(0);
        assert_eq!(config.retention(), Duration::from_secs(60));
        assert_eq!(config.check_interval_secs, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (_dir, sweeper) = sweeper();
        let old = sweeper.store.put(b"old").await.unwrap();

        // Nothing is an hour old yet.
        let report = sweeper.sweep(HOUR).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(sweeper.store.exists(&old).await);

        let later = SystemTime::now() + 2 * HOUR;
        let report = sweeper.sweep_at(HOUR, later).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(!sweeper.store.exists(&old).await);
    }

    #[tokio::test]
    async fn test_repeated_sweep_is_a_no_op() {
        let (_dir, sweeper) = sweeper();
        sweeper.store.put(b"a").await.unwrap();
        sweeper.store.put(b"b").await.unwrap();

        let later = SystemTime::now() + 2 * HOUR;
        assert_eq!(sweeper.sweep_at(HOUR, later).await.unwrap().removed, 2);
        assert_eq!(
            sweeper.sweep_at(HOUR, later).await.unwrap(),
            SweepReport::default()
        );
    }

    #[tokio::test]
    async fn test_background_task_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let sweeper = RetentionSweeper::new(
            SweeperConfig::new()
                .with_retention_secs(0)
                .with_check_interval_secs(1),
            store.clone(),
        );

        let artifact = store.put(b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let token = CancellationToken::new();
        sweeper.start_background_task(token.clone());

        // The first tick fires immediately.
        let mut swept = false;
        for _ in 0..50 {
            if !store.exists(&artifact).await {
                swept = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        token.cancel();
        assert!(swept);
    }
}
