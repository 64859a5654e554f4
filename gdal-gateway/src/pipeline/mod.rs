//! Asynchronous job pipeline.
//!
//! - Job registry owning every job record and its state transitions
//! - Executor running a request's step chain against the transform set
//! - Retrieval of job status and finished outputs
//! - Background sweeping of aged artifacts

mod executor;
mod gateway;
mod job;
mod plan;
mod registry;
mod sweeper;

pub use executor::{ExecutorConfig, PipelineExecutor, Upload};
pub use gateway::{Download, RetrievalGateway};
pub use job::{JobId, JobKind, JobRecord, JobStatus};
pub use plan::{
    DEFAULT_CONVERT_FORMAT, DEFAULT_REPROJECT_SRS, DEFAULT_VECTORIZE_FORMAT, DEFAULT_WMS_FORMAT,
    DEFAULT_WMS_VERSION, JobRequest, PlannedStep, RemoteImageParams,
};
pub use registry::JobRegistry;
pub use sweeper::{RetentionSweeper, SweepReport, SweeperConfig};
