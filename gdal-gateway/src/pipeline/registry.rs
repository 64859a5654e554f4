//! In-memory job registry.
//!
//! The registry owns every job record and is the only place state
//! transitions happen. Records are never removed; only the artifacts they
//! point at are reclaimed.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::job::{JobId, JobKind, JobRecord, JobStatus};
use crate::store::ArtifactRef;
use crate::{Error, Result};

/// Concurrency-safe table of job records.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Lifecycle ==========

    /// Register a new `pending` job and return its id.
    pub fn create(&self, kind: JobKind, source_name: Option<String>) -> JobId {
        loop {
            let job_id = JobId::generate();
            // v4 collisions are not expected, but an id is never handed out twice.
            if let dashmap::Entry::Vacant(slot) = self.jobs.entry(job_id) {
                slot.insert(JobRecord::pending(job_id, kind, source_name));
                debug!(job_id = %job_id, kind = %kind, "Job registered");
                return job_id;
            }
        }
    }

    /// `pending -> success` with the final output artifact.
    pub fn complete_success(&self, job_id: JobId, output: ArtifactRef) -> Result<JobRecord> {
        self.transition(job_id, JobStatus::Success, |record| {
            record.output_reference = Some(output);
        })
    }

    /// `pending -> failed` with a human-readable reason.
    pub fn complete_failure(&self, job_id: JobId, message: impl Into<String>) -> Result<JobRecord> {
        let message = message.into();
        self.transition(job_id, JobStatus::Failed, |record| {
            record.error_detail = Some(message);
        })
    }

    /// Remember an intermediate artifact produced by a pending job.
    pub fn record_intermediate(&self, job_id: JobId, artifact: ArtifactRef) -> Result<()> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::not_found("Job", job_id.to_string()))?;
        if entry.status.is_terminal() {
            return Err(Error::InvalidStateTransition {
                job_id: job_id.to_string(),
                from: entry.status.to_string(),
                to: JobStatus::Pending.to_string(),
            });
        }
        entry.intermediates.push(artifact);
        Ok(())
    }

    /// Check and apply a transition under the entry lock.
    fn transition(
        &self,
        job_id: JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<JobRecord> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::not_found("Job", job_id.to_string()))?;

        if entry.status != JobStatus::Pending {
            warn!(
                job_id = %job_id,
                from = %entry.status,
                to = %to,
                "Rejected transition out of terminal state"
            );
            return Err(Error::InvalidStateTransition {
                job_id: job_id.to_string(),
                from: entry.status.to_string(),
                to: to.to_string(),
            });
        }

        apply(&mut entry);
        entry.status = to;
        entry.finished_at = Some(Utc::now());

        match to {
            JobStatus::Failed => info!(
                job_id = %job_id,
                kind = %entry.kind,
                error = entry.error_detail.as_deref().unwrap_or_default(),
                "Job failed"
            ),
            _ => info!(job_id = %job_id, kind = %entry.kind, status = %to, "Job finished"),
        }

        Ok(entry.clone())
    }

    // ========== Queries ==========

    pub fn get(&self, job_id: JobId) -> Result<JobRecord> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("Job", job_id.to_string()))
    }

    /// Snapshot of every record, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
