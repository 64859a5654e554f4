//! Job identity, status and record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::ArtifactRef;

/// Opaque job identity, generated at submission and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Operation chain a job runs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    RasterInfo,
    VectorInfo,
    Convert,
    Reproject,
    Vectorize,
    RemoteImage,
}

/// Job status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Registered, still running.
    Pending,
    /// Finished with an output artifact.
    Success,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Success and failed never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Everything recorded about one job.
///
/// `output_reference` is set iff `status` is success, `error_detail` iff failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_reference: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Advisory name of the uploaded input. Never used as a path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Artifacts produced by earlier steps of a chain that are not the output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediates: Vec<ArtifactRef>,
}

impl JobRecord {
    pub(crate) fn pending(job_id: JobId, kind: JobKind, source_name: Option<String>) -> Self {
        Self {
            job_id,
            kind,
            status: JobStatus::Pending,
            output_reference: None,
            error_detail: None,
            created_at: Utc::now(),
            finished_at: None,
            source_name,
            intermediates: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_round_trips_through_str() {
        let id = JobId::generate();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Success).unwrap(), "\"success\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Success.is_terminal());
    }

    #[test]
    fn test_pending_record_omits_outcome_fields() {
        let record = JobRecord::pending(JobId::generate(), JobKind::Convert, None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["kind"], "convert");
        assert!(json.get("output_reference").is_none());
        assert!(json.get("error_detail").is_none());
    }
}
