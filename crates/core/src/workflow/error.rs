use thiserror::Error;

use crate::catalog::CatalogError;
use crate::compute::ComputeError;
use crate::executor::ExecutorError;
use crate::fetch::FetchError;
use crate::job::{JobError, JobId};
use crate::staging::StagingError;

/// Errors raised while driving a job through the pipeline.
///
/// The display text of a stage error becomes the job's fail reason.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Job {0} is already running")]
    JobAlreadyRunning(JobId),

    #[error("No images for search criteria")]
    NoImages,

    #[error("Could not prepare compute environment: {0}")]
    Environment(#[source] ComputeError),

    #[error("Workflow coordinator is not running")]
    NotRunning,

    #[error("Catalog query failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Job(#[from] JobError),
}
