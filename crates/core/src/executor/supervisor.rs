//! Shared liveness ticker for stage processes.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::job::JobId;
use crate::metrics;

use super::process::RunningProcess;
use super::ExecutorError;

/// Sent once when a supervised process is found to have exited.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub job_id: JobId,
    pub stage: String,
    /// `None` when the status could not be read.
    pub status: Option<ExitStatus>,
}

struct Supervised {
    process: RunningProcess,
    notify: mpsc::UnboundedSender<ProcessExit>,
}

/// Owns every running stage process, at most one per job.
///
/// One instance is created at startup and handed to whoever launches
/// processes. On each tick it reaps finished processes and drains the
/// output of the others. `tick` can also be driven directly.
pub struct ProcessSupervisor {
    tick_interval: Duration,
    processes: Mutex<HashMap<JobId, Supervised>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProcessSupervisor {
    pub fn new(tick_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tick_interval,
            processes: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Start the periodic ticker.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Process supervisor already running");
            return;
        }

        let supervisor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(
            "Starting process supervisor (tick every {:?})",
            self.tick_interval
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Process supervisor received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(supervisor.tick_interval) => {
                        if !supervisor.running.load(Ordering::Relaxed) {
                            break;
                        }
                        supervisor.tick();
                    }
                }
            }
            info!("Process supervisor stopped");
        });
    }

    /// Stop the ticker. Processes keep running until the supervisor is dropped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Launch a process for `job_id`. Its exit is reported once on `notify`.
    pub fn launch(
        &self,
        job_id: JobId,
        stage: &str,
        program: &Path,
        args: &[String],
        notify: mpsc::UnboundedSender<ProcessExit>,
    ) -> Result<(), ExecutorError> {
        let mut processes = self.lock();
        if processes.contains_key(&job_id) {
            return Err(ExecutorError::AlreadyRunning(job_id));
        }

        let process = RunningProcess::spawn(job_id, stage, program, args)?;
        metrics::STAGES_LAUNCHED.with_label_values(&[stage]).inc();
        processes.insert(job_id, Supervised { process, notify });
        Ok(())
    }

    /// Jobs that currently have a live process.
    pub fn running_jobs(&self) -> Vec<JobId> {
        self.lock().keys().copied().collect()
    }

    /// Reap finished processes and drain the rest. Returns how many exited.
    pub fn tick(&self) -> usize {
        let mut processes = self.lock();

        let mut finished = Vec::new();
        for (job_id, supervised) in processes.iter_mut() {
            match supervised.process.try_finished() {
                Ok(Some(status)) => finished.push((*job_id, Some(status))),
                Ok(None) => {
                    let lines = supervised.process.drain_output();
                    if lines > 0 {
                        debug!("Drained {} line(s) from job {}", lines, job_id);
                    }
                }
                Err(e) => {
                    warn!("Cannot poll process of job {}: {}", job_id, e);
                    finished.push((*job_id, None));
                }
            }
        }

        let count = finished.len();
        for (job_id, status) in finished {
            let Some(mut supervised) = processes.remove(&job_id) else {
                continue;
            };
            supervised.process.drain_output();

            let stage = supervised.process.stage().to_string();
            match status {
                Some(s) if s.success() => info!("{} finished for job {}", stage, job_id),
                Some(s) => warn!("{} exited with {} for job {}", stage, s, job_id),
                None => warn!("{} ended with unknown status for job {}", stage, job_id),
            }

            let exit = ProcessExit {
                job_id,
                stage,
                status,
            };
            if supervised.notify.send(exit).is_err() {
                debug!("Nobody is listening for process exits of job {}", job_id);
            }
        }

        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Supervised>> {
        // the map stays consistent even if a holder panicked
        self.processes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
