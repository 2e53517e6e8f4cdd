//! Artifact publishing.
//!
//! After the post-process chain the final artifact is handed to an artifact
//! store. Uploads are best-effort: the workflow logs a failure and still
//! completes the job. Access URLs are only generated on status queries.

mod config;
mod fs;

pub use config::PublishConfig;
pub use fs::FsArtifactStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Job, JobId};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Artifact for job {job_id} is missing at {path}")]
    MissingArtifact { job_id: JobId, path: String },

    #[error("Upload failed for job {job_id}: {reason}")]
    Upload { job_id: JobId, reason: String },

    #[error("Job {0} has no published artifact")]
    NotPublished(JobId),
}

/// Storage for finished mosaics.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Store the job's final artifact.
    async fn upload(&self, job: &Job) -> Result<(), PublishError>;

    /// Short-lived URL for a stored artifact.
    async fn access_url(&self, job: &Job) -> Result<String, PublishError>;
}
