//! API request and response models (DTOs).
//!
//! # Model Categories
//!
//! - **Pagination**: list parameters and response wrapper
//! - **Jobs**: submission, inspection and status responses
//! - **Maintenance**: triggered sweeps
//! - **Health**: liveness and readiness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{JobRecord, SweepReport};

// ============================================================================
// Pagination
// ============================================================================

/// Maximum page size for list endpoints.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination parameters for list endpoints.
///
/// ```text
/// GET /api/jobs?limit=50&offset=100
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    /// Number of items to return (default: 20, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Number of items to skip
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PaginationParams {
    /// Limit clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// Paginated list response.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Total number of items
    pub total: u64,
    /// Number of items returned
    pub limit: u32,
    /// Number of items skipped
    pub offset: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, limit: u32, offset: u32) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

// ============================================================================
// Job DTOs
// ============================================================================

/// Response to a transform or remote-image submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobRecord> for JobSubmitResponse {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.to_string(),
            status: record.status.to_string(),
            error: record.error_detail.clone(),
        }
    }
}

/// Response to an inspection request; the report is returned inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionResponse {
    pub job_id: String,
    pub status: String,
    /// Advisory name of the uploaded file.
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Job status as returned by `GET /api/jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediates: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id.to_string(),
            kind: record.kind.to_string(),
            status: record.status.to_string(),
            output_reference: record.output_reference.map(|a| a.to_string()),
            error_detail: record.error_detail,
            source_name: record.source_name,
            intermediates: record.intermediates.iter().map(|a| a.to_string()).collect(),
            created_at: record.created_at,
            finished_at: record.finished_at,
        }
    }
}

// ============================================================================
// Maintenance DTOs
// ============================================================================

/// Request body for a triggered sweep. Missing fields use the configured retention.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepRequest {
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub removed: u64,
    pub failed: u64,
    pub max_age_secs: u64,
}

impl SweepResponse {
    pub fn new(report: SweepReport, max_age_secs: u64) -> Self {
        Self {
            removed: report.removed,
            failed: report.failed,
            max_age_secs,
        }
    }
}

// ============================================================================
// Health DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub jobs: usize,
}
