//! Distributed compute stage abstraction.
//!
//! The compute system turns staged imagery into mosaic tiles in the job's
//! staging directory. The core only prepares, submits and polls.

mod config;
mod local;
mod types;

pub use config::ComputeConfig;
pub use local::LocalCommandCluster;
pub use types::{ComputeError, ComputeStatus};

use async_trait::async_trait;

use crate::job::Job;

/// Submission and status API of the compute system.
#[async_trait]
pub trait ComputeCluster: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Reset shared compute resources before a new job.
    async fn prepare_environment(&self) -> Result<(), ComputeError>;

    /// Submit the compute job for `job` and return its external id.
    async fn submit(&self, job: &Job) -> Result<String, ComputeError>;

    /// Status of an external job, or `None` if the id is unknown.
    async fn status(&self, compute_job_id: &str) -> Result<Option<ComputeStatus>, ComputeError>;
}
