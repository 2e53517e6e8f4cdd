use serde::Serialize;
use thiserror::Error;

/// State of a submitted compute job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ComputeStatus {
    Pending,
    Succeeded,
    Failed(String),
}

impl ComputeStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ComputeStatus::Pending)
    }
}

/// Errors from the compute system.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Compute environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("Compute submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Compute status query failed: {0}")]
    StatusQuery(String),
}
