//! Error types for the executor module.

use std::path::PathBuf;

use thiserror::Error;

use crate::job::JobId;

/// Errors raised while launching post-process stages.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Stage binary missing.
    #[error("Executable not found at path: {path}")]
    ExecutableNotFound { path: PathBuf },

    /// A stage could not compute its argument list for a job.
    #[error("Cannot build arguments for stage {stage}: {reason}")]
    StageArguments { stage: String, reason: String },

    /// The job already has a live process.
    #[error("Job {0} already has a running process")]
    AlreadyRunning(JobId),

    /// The job already has a chain in flight.
    #[error("Job {0} already has a process chain in progress")]
    ChainInProgress(JobId),

    /// A chain needs at least one stage.
    #[error("Process chain has no stages")]
    EmptyChain,

    /// Spawning the process failed.
    #[error("Exception while running command {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutorError {
    /// Creates a stage argument error.
    pub fn stage_arguments(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageArguments {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}
