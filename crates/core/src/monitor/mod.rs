//! Compute job monitor.
//!
//! Polls the compute system for the single job in `RunningCompute` and
//! reports its outcome. It does not schedule itself; [`spawn_monitor_timer`]
//! or the caller drives [`ComputeMonitor::check_once`].

mod config;

pub use config::MonitorConfig;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::compute::{ComputeCluster, ComputeError, ComputeStatus};
use crate::job::{Job, JobError, JobId, JobStatus, JobStore};
use crate::metrics;
use crate::staging::{ImageStaging, StagingError};

/// Final state of a compute job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeOutcome {
    Succeeded,
    Failed(String),
}

/// A finished compute job, handed to the workflow.
///
/// The receiver answers on `handled` once the job's transition is persisted,
/// or with the reason it could not be.
#[derive(Debug)]
pub struct ComputeEvent {
    pub job: Job,
    pub outcome: ComputeOutcome,
    pub handled: oneshot::Sender<Result<(), String>>,
}

/// What a single check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTick {
    /// No job is in the compute stage.
    Idle,
    /// The compute job is still running.
    Pending(JobId),
    /// The compute job finished and its outcome was handled.
    Finished(JobId),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("More than one job is running compute: {0:?}")]
    MultipleRunning(Vec<JobId>),

    #[error("Job {0} is running compute without a compute job id")]
    MissingComputeId(JobId),

    #[error("Compute system did not know about job id {compute_job_id} (job {job_id}); repository may be out of sync")]
    UnknownComputeJob {
        job_id: JobId,
        compute_job_id: String,
    },

    #[error("Compute event receiver is gone")]
    Disconnected,

    #[error("Handling compute outcome failed: {0}")]
    Handling(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

pub struct ComputeMonitor {
    store: Arc<dyn JobStore>,
    cluster: Arc<dyn ComputeCluster>,
    staging: ImageStaging,
    events: mpsc::UnboundedSender<ComputeEvent>,
}

impl ComputeMonitor {
    pub fn new(
        store: Arc<dyn JobStore>,
        cluster: Arc<dyn ComputeCluster>,
        staging: ImageStaging,
        events: mpsc::UnboundedSender<ComputeEvent>,
    ) -> Self {
        Self {
            store,
            cluster,
            staging,
            events,
        }
    }

    /// Poll once. A finished job is reported and awaited, then the staging
    /// area is cleared. Staging is left alone when handling failed.
    pub async fn check_once(&self) -> Result<MonitorTick, MonitorError> {
        let mut running = self.store.find_by_status(&[JobStatus::RunningCompute])?;
        if running.len() > 1 {
            return Err(MonitorError::MultipleRunning(
                running.iter().map(|j| j.id).collect(),
            ));
        }
        let Some(job) = running.pop() else {
            return Ok(MonitorTick::Idle);
        };

        let compute_job_id = job
            .compute_job_id()
            .ok_or(MonitorError::MissingComputeId(job.id))?
            .to_string();

        let status = self
            .cluster
            .status(&compute_job_id)
            .await?
            .ok_or_else(|| MonitorError::UnknownComputeJob {
                job_id: job.id,
                compute_job_id: compute_job_id.clone(),
            })?;

        let outcome = match status {
            ComputeStatus::Pending => {
                debug!("Compute job {} for job {} still running", compute_job_id, job.id);
                return Ok(MonitorTick::Pending(job.id));
            }
            ComputeStatus::Succeeded => {
                info!("Compute job {} for job {} succeeded", compute_job_id, job.id);
                ComputeOutcome::Succeeded
            }
            ComputeStatus::Failed(reason) => {
                info!(
                    "Compute job {} for job {} failed: {}",
                    compute_job_id, job.id, reason
                );
                ComputeOutcome::Failed(reason)
            }
        };

        let job_id = job.id;
        let (handled_tx, handled_rx) = oneshot::channel();
        self.events
            .send(ComputeEvent {
                job,
                outcome,
                handled: handled_tx,
            })
            .map_err(|_| MonitorError::Disconnected)?;
        handled_rx
            .await
            .map_err(|_| MonitorError::Disconnected)?
            .map_err(MonitorError::Handling)?;

        self.staging.clean().await?;
        Ok(MonitorTick::Finished(job_id))
    }
}

/// Run `check_once` every `interval` until shutdown. Errors are logged and
/// the next tick proceeds.
pub fn spawn_monitor_timer(
    monitor: Arc<ComputeMonitor>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Compute monitor started (every {:?})", interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Compute monitor received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    match monitor.check_once().await {
                        Ok(tick) => {
                            let label = match tick {
                                MonitorTick::Idle => "idle",
                                MonitorTick::Pending(_) => "pending",
                                MonitorTick::Finished(_) => "finished",
                            };
                            metrics::MONITOR_TICKS.with_label_values(&[label]).inc();
                        }
                        Err(e) => {
                            metrics::MONITOR_TICKS.with_label_values(&["error"]).inc();
                            error!("Compute monitor error: {}", e);
                        }
                    }
                }
            }
        }
        info!("Compute monitor stopped");
    })
}
