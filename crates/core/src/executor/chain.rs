//! Ordered chains of stage processes, one cursor per job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::job::{Job, JobId};

use super::stages::ExecutableStage;
use super::supervisor::{ProcessExit, ProcessSupervisor};
use super::ExecutorError;

/// Outcome of a whole chain for one job. Sent exactly once per chain.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// Every stage ran.
    Completed(Job),
    /// A later stage could not be launched.
    Failed { job: Job, reason: String },
}

struct ChainCursor {
    job: Job,
    index: usize,
}

/// Runs a fixed list of stages in order for each job.
///
/// A stage starts only after the previous stage's process has been reaped
/// by the supervisor.
pub struct ProcessChain {
    stages: Vec<Arc<dyn ExecutableStage>>,
    supervisor: Arc<ProcessSupervisor>,
    cursors: Mutex<HashMap<JobId, ChainCursor>>,
    events: mpsc::UnboundedSender<ChainEvent>,

    exits_tx: mpsc::UnboundedSender<ProcessExit>,
    exits_rx: Mutex<Option<mpsc::UnboundedReceiver<ProcessExit>>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProcessChain {
    /// Chain outcomes are sent on `events`.
    pub fn new(
        stages: Vec<Arc<dyn ExecutableStage>>,
        supervisor: Arc<ProcessSupervisor>,
        events: mpsc::UnboundedSender<ChainEvent>,
    ) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            stages,
            supervisor,
            cursors: Mutex::new(HashMap::new()),
            events,
            exits_tx,
            exits_rx: Mutex::new(Some(exits_rx)),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Start listening for stage exits.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Process chain already running");
            return;
        }
        let Some(mut exits_rx) = self.exits_rx.lock().ok().and_then(|mut rx| rx.take()) else {
            warn!("Process chain cannot be restarted");
            return;
        };

        let chain = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Process chain received shutdown signal");
                        break;
                    }
                    Some(exit) = exits_rx.recv() => {
                        chain.on_stage_completed(exit);
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Launch the first stage for `job`.
    ///
    /// Argument or launch failures of the first stage are returned here;
    /// failures of later stages arrive as [`ChainEvent::Failed`].
    pub fn run_for(&self, job: &Job) -> Result<(), ExecutorError> {
        if self.stages.is_empty() {
            return Err(ExecutorError::EmptyChain);
        }

        let mut cursors = self.lock();
        if cursors.contains_key(&job.id) {
            return Err(ExecutorError::ChainInProgress(job.id));
        }

        self.launch_stage(job, 0)?;
        cursors.insert(
            job.id,
            ChainCursor {
                job: job.clone(),
                index: 0,
            },
        );
        Ok(())
    }

    /// Jobs with a chain in progress.
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.lock().keys().copied().collect()
    }

    /// Current stage index of a job's chain.
    pub fn current_stage(&self, job_id: &JobId) -> Option<usize> {
        self.lock().get(job_id).map(|c| c.index)
    }

    fn launch_stage(&self, job: &Job, index: usize) -> Result<(), ExecutorError> {
        let stage = &self.stages[index];
        let args = stage.args_for(job)?;
        debug!(
            "Launching stage {}/{} ({}) for job {}",
            index + 1,
            self.stages.len(),
            stage.name(),
            job.id
        );
        self.supervisor.launch(
            job.id,
            stage.name(),
            stage.program(),
            &args,
            self.exits_tx.clone(),
        )
    }

    /// Advance the job's cursor after a stage exit.
    pub(crate) fn on_stage_completed(&self, exit: ProcessExit) {
        let mut cursors = self.lock();
        let Some(cursor) = cursors.get_mut(&exit.job_id) else {
            debug!("Ignoring exit of {} for unknown job {}", exit.stage, exit.job_id);
            return;
        };

        cursor.index += 1;
        if cursor.index < self.stages.len() {
            let index = cursor.index;
            let job = cursor.job.clone();
            if let Err(e) = self.launch_stage(&job, index) {
                error!("Stage {} failed to start for job {}: {}", index + 1, job.id, e);
                cursors.remove(&exit.job_id);
                self.emit(ChainEvent::Failed {
                    job,
                    reason: e.to_string(),
                });
            }
            return;
        }

        if let Some(finished) = cursors.remove(&exit.job_id) {
            info!("All post-process stages finished for job {}", exit.job_id);
            self.emit(ChainEvent::Completed(finished.job));
        }
    }

    fn emit(&self, event: ChainEvent) {
        if self.events.send(event).is_err() {
            warn!("Chain event receiver dropped");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, ChainCursor>> {
        self.cursors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
