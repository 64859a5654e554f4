//! Gateway configuration assembled from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::pipeline::{ExecutorConfig, SweeperConfig};
use crate::transform::{GdalTools, RemoteFetchConfig};

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api: ApiServerConfig,
    /// Artifact store root (`GATEWAY_STORE_DIR`).
    pub store_dir: PathBuf,
    /// Enables daily log files when set (`GATEWAY_LOG_DIR`).
    pub log_dir: Option<PathBuf>,
    pub executor: ExecutorConfig,
    pub sweeper: SweeperConfig,
    pub remote: RemoteFetchConfig,
    pub tools: GdalTools,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            store_dir: default_store_dir(),
            log_dir: None,
            executor: ExecutorConfig::default(),
            sweeper: SweeperConfig::default(),
            remote: RemoteFetchConfig::default(),
            tools: GdalTools::default(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    std::env::temp_dir().join("gdal_api")
}

impl GatewayConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            warn!(error = %e, "Failed to load .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            api: ApiServerConfig::from_lookup(&lookup),
            tools: GdalTools::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(dir) = non_empty(&lookup, "GATEWAY_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        config.log_dir = non_empty(&lookup, "GATEWAY_LOG_DIR").map(PathBuf::from);

        if let Some(max) = parsed::<usize>(&lookup, "GATEWAY_MAX_CONCURRENT_JOBS") {
            config.executor.max_concurrent_jobs = max.max(1);
        }
        if let Some(enabled) = parsed::<bool>(&lookup, "GATEWAY_CLEANUP_INTERMEDIATES") {
            config.executor.cleanup_intermediates = enabled;
        }
        if let Some(secs) = parsed(&lookup, "GATEWAY_RETENTION_SECS") {
            config.sweeper.retention_secs = secs;
        }
        if let Some(secs) = parsed(&lookup, "GATEWAY_SWEEP_INTERVAL_SECS") {
            config.sweeper.check_interval_secs = secs;
        }
        if let Some(secs) = parsed(&lookup, "GATEWAY_REMOTE_TIMEOUT_SECS") {
            config.remote.timeout_secs = secs;
        }
        if let Some(secs) = parsed(&lookup, "GATEWAY_COMMAND_TIMEOUT_SECS") {
            config.tools.command_timeout_secs = secs;
        }

        config
    }
}

pub(crate) fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = non_empty(lookup, key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}
