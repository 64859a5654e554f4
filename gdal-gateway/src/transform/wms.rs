//! Remote image acquisition through a WMS `GetMap` request.
//!
//! The fetched image carries no spatial reference of its own; the pipeline
//! follows it with `assign-georeference` and `reproject`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::failure::{FailureReason, TransformFailure};
use super::params::image_format_extension;
use super::request::{
    RemoteAuth, RemoteImageRequest, TransformKind, TransformOutput, TransformRequest,
};
use super::traits::{Transform, TransformContext, unexpected_request};
use crate::store::{ArtifactRef, ArtifactStore};
use crate::{Error, Result};

const KIND: TransformKind = TransformKind::FetchRemoteImage;

/// Longest service exception excerpt kept in a failure message.
const MAX_EXCEPTION_CHARS: usize = 300;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Outbound request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFetchConfig {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("gdal-gateway/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RemoteFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Build the `GetMap` URL, keeping any query parameters already on `service_url`.
pub fn build_get_map_url(request: &RemoteImageRequest) -> std::result::Result<Url, TransformFailure> {
    let mut url = Url::parse(&request.service_url).map_err(|e| {
        TransformFailure::invalid_input(KIND, format!("invalid service url '{}': {e}", request.service_url))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransformFailure::invalid_input(
            KIND,
            format!("unsupported service url scheme '{}'", url.scheme()),
        ));
    }

    // WMS 1.3.0 renamed SRS to CRS.
    let srs_key = if request.version.starts_with("1.3") {
        "CRS"
    } else {
        "SRS"
    };

    url.query_pairs_mut()
        .append_pair("SERVICE", "WMS")
        .append_pair("REQUEST", "GetMap")
        .append_pair("VERSION", &request.version)
        .append_pair("LAYERS", &request.layer)
        .append_pair("STYLES", "")
        .append_pair("BBOX", &request.bbox.to_string())
        .append_pair("WIDTH", &request.width.to_string())
        .append_pair("HEIGHT", &request.height.to_string())
        .append_pair(srs_key, request.srs.as_str())
        .append_pair("FORMAT", &request.format);

    Ok(url)
}

/// Fetches WMS imagery into the artifact store.
#[derive(Debug, Clone)]
pub struct RemoteImageFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteImageFetcher {
    pub fn new(config: &RemoteFetchConfig) -> Result<Self> {
        install_rustls_provider();

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs.max(1)).min(timeout);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::config(format!("building HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Fetch the image described by `request` into a new artifact.
    pub async fn fetch(
        &self,
        request: &RemoteImageRequest,
        store: &ArtifactStore,
    ) -> std::result::Result<ArtifactRef, TransformFailure> {
        let url = build_get_map_url(request)?;
        let host = url.host_str().unwrap_or("remote service").to_string();
        info!(host = %host, layer = %request.layer, bbox = %request.bbox, "Fetching remote image");

        let mut builder = self.client.get(url);
        builder = match &request.auth {
            Some(RemoteAuth::Bearer(token)) => builder.bearer_auth(token),
            Some(RemoteAuth::Basic { username, password }) => {
                builder.basic_auth(username, password.as_deref())
            }
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            let what = if e.is_timeout() {
                format!("no response from {host} within {}s", self.timeout.as_secs())
            } else if e.is_connect() {
                format!("could not connect to {host}")
            } else {
                format!("request to {host} failed")
            };
            warn!(host = %host, error = %e, "Remote image request failed");
            TransformFailure::network(KIND, format!("{what}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(host = %host, status = %status, "Remote service returned an error status");
            return Err(TransformFailure::new(
                KIND,
                FailureReason::RemoteStatus(status.as_u16()),
                format!("remote service {host} responded with HTTP {status}"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        // Servers report GetMap errors as a 200 with an XML exception document.
        if content_type.contains("xml") {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.trim().chars().take(MAX_EXCEPTION_CHARS).collect();
            return Err(TransformFailure::new(
                KIND,
                FailureReason::RemoteException,
                format!("remote service {host} returned a service exception: {excerpt}"),
            ));
        }

        let extension = image_format_extension(&request.format);
        let mut writer = store
            .create(Some(extension.as_str()))
            .await
            .map_err(|e| TransformFailure::storage(KIND, e))?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    writer.abort().await;
                    return Err(TransformFailure::network(
                        KIND,
                        format!("transfer from {host} interrupted: {e}"),
                    ));
                }
            };
            if let Err(e) = writer.write(&chunk).await {
                writer.abort().await;
                return Err(TransformFailure::storage(KIND, e));
            }
        }

        if writer.bytes_written() == 0 {
            writer.abort().await;
            return Err(TransformFailure::new(
                KIND,
                FailureReason::RemoteException,
                format!("remote service {host} returned an empty image"),
            ));
        }

        let written = writer.bytes_written();
        let artifact = writer
            .finish()
            .await
            .map_err(|e| TransformFailure::storage(KIND, e))?;
        info!(artifact = %artifact, bytes = written, "Remote image stored");
        Ok(artifact)
    }
}

#[async_trait]
impl Transform for RemoteImageFetcher {
    fn kind(&self) -> TransformKind {
        KIND
    }

    fn name(&self) -> &'static str {
        "RemoteImageFetcher"
    }

    async fn apply(
        &self,
        request: &TransformRequest,
        ctx: &TransformContext,
    ) -> std::result::Result<TransformOutput, TransformFailure> {
        let TransformRequest::FetchRemoteImage(remote) = request else {
            return Err(unexpected_request(KIND, request));
        };
        self.fetch(remote, &ctx.store)
            .await
            .map(TransformOutput::Artifact)
    }
}
