//! Pipeline executor.
//!
//! Drives one job from submission to its terminal state: register, stage the
//! upload, run the step chain threading each output into the next step,
//! record the outcome, and remove the staged input on every path, a panicking
//! transform included.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::job::{JobId, JobRecord};
use super::plan::JobRequest;
use super::registry::JobRegistry;
use crate::store::{ArtifactRef, ArtifactStore, extension_from_name};
use crate::transform::{
    TransformContext, TransformFailure, TransformKind, TransformOutput, TransformSet,
};
use crate::{Error, Result};

/// Configuration for the pipeline executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Pipelines allowed to run at once; further jobs wait as `pending`.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Delete the intermediate artifacts of a multi-step chain once it succeeds.
    /// Off by default: intermediates are left to the retention sweeper.
    #[serde(default)]
    pub cleanup_intermediates: bool,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            cleanup_intermediates: false,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_cleanup_intermediates(mut self, enabled: bool) -> Self {
        self.cleanup_intermediates = enabled;
        self
    }
}

/// Uploaded input for a job.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Advisory original name; only its extension is carried over.
    pub name: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(name: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name,
            bytes: bytes.into(),
        }
    }
}

/// Runs submitted jobs against the transform set.
#[derive(Clone)]
pub struct PipelineExecutor {
    registry: JobRegistry,
    store: ArtifactStore,
    transforms: Arc<TransformSet>,
    permits: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl PipelineExecutor {
    pub fn new(
        registry: JobRegistry,
        store: ArtifactStore,
        transforms: Arc<TransformSet>,
        config: ExecutorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            registry,
            store,
            transforms,
            permits,
            config,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Register and run a job to completion, returning its terminal record.
    ///
    /// The job runs in its own task: dropping the returned future (a client
    /// disconnect) does not leave the job `pending`.
    pub async fn submit(&self, request: JobRequest, upload: Option<Upload>) -> Result<JobRecord> {
        if request.takes_upload() && upload.is_none() {
            return Err(Error::intake(format!(
                "{} jobs require an uploaded file",
                request.kind()
            )));
        }

        let source_name = upload.as_ref().and_then(|u| u.name.clone());
        let job_id = self.registry.create(request.kind(), source_name);
        info!(job_id = %job_id, kind = %request.kind(), "Job submitted");

        let executor = self.clone();
        let handle = tokio::spawn(async move { executor.execute(job_id, request, upload).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Pipeline task aborted");
                Err(Error::Other(format!("pipeline aborted unexpectedly: {e}")))
            }
        };
        result.or_else(|e| self.fail_if_pending(job_id, e))
    }

    /// Settle a job that errored outside the chain, so it never stays `pending`.
    fn fail_if_pending(&self, job_id: JobId, err: Error) -> Result<JobRecord> {
        match self.registry.get(job_id) {
            Ok(record) if !record.is_terminal() => {
                self.registry.complete_failure(job_id, err.to_string())
            }
            _ => Err(err),
        }
    }

    async fn execute(
        &self,
        job_id: JobId,
        request: JobRequest,
        upload: Option<Upload>,
    ) -> Result<JobRecord> {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return self
                    .registry
                    .complete_failure(job_id, "pipeline executor is shut down");
            }
        };
        let started = Instant::now();

        let input = match upload {
            Some(upload) => match self.stage(&upload).await {
                Ok(input) => Some(input),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Failed to stage upload");
                    return self
                        .registry
                        .complete_failure(job_id, format!("storing upload failed: {e}"));
                }
            },
            None => None,
        };

        // A panicking transform must still reach the input cleanup.
        let executor = self.clone();
        let chain_input = input.clone();
        let chain =
            tokio::spawn(async move { executor.run_chain(job_id, &request, chain_input).await });
        let outcome = match chain.await {
            Ok(outcome) => outcome.map_err(|failure| failure.to_string()),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Transform chain aborted");
                Err(format!("pipeline aborted unexpectedly: {e}"))
            }
        };

        // Inputs are single-use staging; only the output outlives the job.
        if let Some(input) = &input
            && let Err(e) = self.store.delete(input).await
        {
            warn!(job_id = %job_id, artifact = %input, error = %e, "Failed to remove staged input");
        }

        let record = match outcome {
            Ok(output) => {
                let record = self.registry.complete_success(job_id, output)?;
                if self.config.cleanup_intermediates {
                    self.remove_intermediates(&record).await;
                }
                record
            }
            Err(message) => {
                let record = self.registry.complete_failure(job_id, message)?;
                if !record.intermediates.is_empty() {
                    warn!(
                        job_id = %job_id,
                        orphaned = record.intermediates.len(),
                        "Intermediate artifacts left for the retention sweeper"
                    );
                }
                record
            }
        };

        debug!(
            job_id = %job_id,
            status = %record.status,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Pipeline finished"
        );
        Ok(record)
    }

    async fn stage(&self, upload: &Upload) -> Result<ArtifactRef> {
        let extension = upload.name.as_deref().and_then(extension_from_name);
        let input = self
            .store
            .put_with_extension(&upload.bytes, extension.as_deref())
            .await?;
        debug!(artifact = %input, bytes = upload.bytes.len(), "Staged upload");
        Ok(input)
    }

    /// Plan and run every step, returning the final artifact.
    async fn run_chain(
        &self,
        job_id: JobId,
        request: &JobRequest,
        input: Option<ArtifactRef>,
    ) -> std::result::Result<ArtifactRef, TransformFailure> {
        let steps = request.plan()?;
        let total = steps.len();
        let ctx = TransformContext::new(self.store.clone(), job_id.to_string());

        let mut current = input;
        for (index, step) in steps.into_iter().enumerate() {
            let kind = step.kind();
            let step_no = index + 1;
            info!(job_id = %job_id, step = step_no, total, kind = %kind, "Running step");

            let transform_request = step.bind(current.take())?;
            let produced = match self.transforms.apply(&transform_request, &ctx).await? {
                TransformOutput::Artifact(artifact) => artifact,
                TransformOutput::Report(report) => self
                    .store
                    .put_with_extension(report.as_bytes(), Some("txt"))
                    .await
                    .map_err(|e| TransformFailure::storage(kind, e))?,
            };

            if step_no < total
                && let Err(e) = self.registry.record_intermediate(job_id, produced.clone())
            {
                warn!(job_id = %job_id, artifact = %produced, error = %e, "Failed to record intermediate");
            }
            current = Some(produced);
        }

        current.ok_or_else(|| {
            TransformFailure::invalid_input(TransformKind::RasterInfo, "job planned no steps")
        })
    }

    async fn remove_intermediates(&self, record: &JobRecord) {
        for artifact in &record.intermediates {
            if let Err(e) = self.store.delete(artifact).await {
                warn!(job_id = %record.job_id, artifact = %artifact, error = %e, "Failed to remove intermediate");
            }
        }
    }
}
