//! Status and download of finished jobs.

use bytes::Bytes;
use tracing::debug;

use super::job::{JobId, JobRecord, JobStatus};
use super::registry::JobRegistry;
use crate::store::{ArtifactRef, ArtifactStore};
use crate::{Error, Result};

/// A downloadable job output.
#[derive(Debug, Clone)]
pub struct Download {
    pub artifact: ArtifactRef,
    pub bytes: Bytes,
    /// Suggested file name, `<job_id>.<ext>`.
    pub file_name: String,
}

/// Answers status and download queries against the registry and store.
#[derive(Debug, Clone)]
pub struct RetrievalGateway {
    registry: JobRegistry,
    store: ArtifactStore,
}

impl RetrievalGateway {
    pub fn new(registry: JobRegistry, store: ArtifactStore) -> Self {
        Self { registry, store }
    }

    pub fn status(&self, job_id: JobId) -> Result<JobRecord> {
        self.registry.get(job_id)
    }

    /// Output bytes of a successful job.
    ///
    /// Unknown job: `NotFound`. Not successful: `NotReady`. Output reclaimed
    /// since success was recorded: `ArtifactGone`.
    pub async fn download(&self, job_id: JobId) -> Result<Download> {
        let record = self.registry.get(job_id)?;

        let artifact = match (&record.status, &record.output_reference) {
            (JobStatus::Success, Some(artifact)) => artifact.clone(),
            (status, _) => {
                return Err(Error::NotReady {
                    job_id: job_id.to_string(),
                    status: status.to_string(),
                });
            }
        };

        let bytes = match self.store.get(&artifact).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!(job_id = %job_id, artifact = %artifact, "Output already reclaimed");
                return Err(Error::ArtifactGone {
                    job_id: job_id.to_string(),
                    artifact: artifact.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let file_name = match artifact.extension() {
            Some(ext) => format!("{job_id}.{ext}"),
            None => job_id.to_string(),
        };

        Ok(Download {
            artifact,
            bytes,
            file_name,
        })
    }
}
