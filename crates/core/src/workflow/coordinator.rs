//! The workflow coordinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{collect_image_urls, Catalog, SearchCriteria};
use crate::compute::ComputeCluster;
use crate::executor::{ChainEvent, ProcessChain};
use crate::fetch::{FetchStats, ImageFetcher};
use crate::job::{Job, JobStore};
use crate::metrics;
use crate::monitor::{ComputeEvent, ComputeOutcome};
use crate::publish::ArtifactPublisher;
use crate::staging::ImageStaging;

use super::WorkflowError;

/// Collaborators of the coordinator.
pub struct WorkflowParts {
    pub store: Arc<dyn JobStore>,
    pub catalog: Arc<dyn Catalog>,
    pub fetcher: Arc<ImageFetcher>,
    pub staging: ImageStaging,
    pub cluster: Arc<dyn ComputeCluster>,
    pub chain: Arc<ProcessChain>,
    pub publisher: Arc<dyn ArtifactPublisher>,
    /// Locations requested per catalog page.
    pub page_size: usize,
}

/// Snapshot of the coordinator for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub running: bool,
    /// A job is between catalog query and compute submission.
    pub lane_busy: bool,
    pub post_processing: usize,
    pub fetch: FetchStats,
}

struct LaneRequest {
    job: Job,
    criteria: SearchCriteria,
}

/// Drives jobs from catalog query to completion.
///
/// The first half of a job (catalog, fetch, staging, submission) runs on a
/// single lane; requests queue behind each other. The second half is driven
/// by [`ComputeEvent`]s from the monitor and [`ChainEvent`]s from the
/// post-process chain.
///
/// # Example
///
/// ```ignore
/// let (chain_tx, chain_rx) = mpsc::unbounded_channel();
/// let (compute_tx, compute_rx) = mpsc::unbounded_channel();
/// // build the chain with chain_tx and the monitor with compute_tx
/// let coordinator = Arc::new(WorkflowCoordinator::new(parts, chain_rx, compute_rx));
/// coordinator.start();
///
/// let job = coordinator.submit(criteria, Some("png"))?;
/// ```
pub struct WorkflowCoordinator {
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn Catalog>,
    fetcher: Arc<ImageFetcher>,
    staging: ImageStaging,
    cluster: Arc<dyn ComputeCluster>,
    chain: Arc<ProcessChain>,
    publisher: Arc<dyn ArtifactPublisher>,
    page_size: usize,

    // Runtime state
    lane_tx: mpsc::UnboundedSender<LaneRequest>,
    receivers: Mutex<Option<Receivers>>,
    admission: Mutex<()>,
    lane_busy: AtomicBool,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Receivers {
    lane: mpsc::UnboundedReceiver<LaneRequest>,
    chain: mpsc::UnboundedReceiver<ChainEvent>,
    compute: mpsc::UnboundedReceiver<ComputeEvent>,
}

impl WorkflowCoordinator {
    pub fn new(
        parts: WorkflowParts,
        chain_events: mpsc::UnboundedReceiver<ChainEvent>,
        compute_events: mpsc::UnboundedReceiver<ComputeEvent>,
    ) -> Self {
        let (lane_tx, lane_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            store: parts.store,
            catalog: parts.catalog,
            fetcher: parts.fetcher,
            staging: parts.staging,
            cluster: parts.cluster,
            chain: parts.chain,
            publisher: parts.publisher,
            page_size: parts.page_size,
            lane_tx,
            receivers: Mutex::new(Some(Receivers {
                lane: lane_rx,
                chain: chain_events,
                compute: compute_events,
            })),
            admission: Mutex::new(()),
            lane_busy: AtomicBool::new(false),
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workflow lane and the event loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Workflow coordinator already running");
            return;
        }
        let Some(receivers) = self.receivers.lock().ok().and_then(|mut r| r.take()) else {
            warn!("Workflow coordinator cannot be restarted");
            return;
        };

        info!("Starting workflow coordinator");
        let lane = self.spawn_lane(receivers.lane);
        let events = self.spawn_event_loop(receivers.chain, receivers.compute);
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend([lane, events]);
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping workflow coordinator");
        let _ = self.shutdown_tx.send(());
    }

    /// Stop, then wait for the lane and the event loop to finish the work
    /// in hand so no job write lands after this returns.
    ///
    /// Tasks still busy after `grace` are aborted and `false` is returned.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stop();
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();

        match tokio::time::timeout(grace, futures::future::join_all(tasks)).await {
            Ok(_) => {
                info!("Workflow coordinator stopped");
                true
            }
            Err(_) => {
                warn!("Workflow tasks still busy after {:?}, aborting", grace);
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            running: self.running.load(Ordering::Relaxed),
            lane_busy: self.lane_busy.load(Ordering::Relaxed),
            post_processing: self.chain.active_jobs().len(),
            fetch: self.fetcher.stats(),
        }
    }

    /// Create and persist a job for `criteria`, then start it.
    ///
    /// If another job is running the new job is inserted already `Failed`,
    /// so the store never holds a second running row, and
    /// [`WorkflowError::JobAlreadyRunning`] is returned.
    pub fn submit(
        &self,
        criteria: SearchCriteria,
        output_format: Option<&str>,
    ) -> Result<Job, WorkflowError> {
        let _admission = self.admit();

        let mut job = Job::new(output_format);
        if let Some(err) = self.running_conflict(&job)? {
            warn!("Rejecting job {}: {}", job.id, err);
            job.fail(err.to_string())?;
            self.store.add(&job)?;
            record_finished(&job, "failed");
            return Err(err);
        }

        self.store.add(&job)?;
        info!(
            "Created job {} (output format {})",
            job.id,
            job.output_format.as_str()
        );

        self.enqueue(job.clone(), criteria)?;
        Ok(job)
    }

    /// Queue an already persisted `job` on the workflow lane.
    ///
    /// Fails fast if any other job is in a running status. The rejected job
    /// is marked `Failed`.
    pub fn start_for(&self, mut job: Job, criteria: SearchCriteria) -> Result<(), WorkflowError> {
        let _admission = self.admit();

        if let Some(err) = self.running_conflict(&job)? {
            warn!("Rejecting job {}: {}", job.id, err);
            self.fail_job(&mut job, &err.to_string())?;
            return Err(err);
        }
        self.enqueue(job, criteria)
    }

    fn admit(&self) -> std::sync::MutexGuard<'_, ()> {
        self.admission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The error to reject `job` with when some other job is running.
    fn running_conflict(&self, job: &Job) -> Result<Option<WorkflowError>, WorkflowError> {
        Ok(self
            .store
            .find_running()?
            .into_iter()
            .find(|running| running.id != job.id)
            .map(|other| WorkflowError::JobAlreadyRunning(other.id)))
    }

    fn enqueue(&self, job: Job, criteria: SearchCriteria) -> Result<(), WorkflowError> {
        if let Err(mpsc::error::SendError(request)) =
            self.lane_tx.send(LaneRequest { job, criteria })
        {
            let mut job = request.job;
            self.fail_job(&mut job, &WorkflowError::NotRunning.to_string())?;
            return Err(WorkflowError::NotRunning);
        }
        Ok(())
    }

    /// `RunningCompute -> RunningPostProcess`, then launch the chain.
    ///
    /// A chain that cannot start fails the job; that is not an error of
    /// this call.
    pub async fn on_compute_success(&self, mut job: Job) -> Result<(), WorkflowError> {
        job.start_post_process()?;
        self.store.update(&job)?;
        info!("Job {} entered post-processing", job.id);

        if let Err(e) = self.chain.run_for(&job) {
            error!("Post-process chain for job {} did not start: {}", job.id, e);
            self.fail_job(&mut job, &e.to_string())?;
        }
        Ok(())
    }

    /// `RunningCompute -> Failed` with the compute system's reason.
    pub async fn on_compute_failure(&self, mut job: Job, reason: &str) -> Result<(), WorkflowError> {
        warn!("Compute failed for job {}: {}", job.id, reason);
        self.fail_job(&mut job, reason)
    }

    /// Publish the artifact and complete the job.
    ///
    /// A failed upload is only logged; the job still completes and the
    /// status query then has no link to offer.
    pub async fn on_chain_completed(&self, mut job: Job) -> Result<(), WorkflowError> {
        if let Err(e) = self.publisher.upload(&job).await {
            error!("Publishing artifact for job {} failed: {}", job.id, e);
        }

        job.complete()?;
        self.store.update(&job)?;
        record_finished(&job, "completed");
        info!("Job {} completed", job.id);
        Ok(())
    }

    /// A later chain stage could not be launched.
    pub async fn on_chain_failed(&self, mut job: Job, reason: &str) -> Result<(), WorkflowError> {
        warn!("Post-process chain failed for job {}: {}", job.id, reason);
        self.fail_job(&mut job, reason)
    }

    fn fail_job(&self, job: &mut Job, reason: &str) -> Result<(), WorkflowError> {
        job.fail(reason)?;
        self.store.update(job)?;
        record_finished(job, "failed");
        Ok(())
    }

    fn spawn_lane(
        self: &Arc<Self>,
        mut lane_rx: mpsc::UnboundedReceiver<LaneRequest>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Workflow lane started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Workflow lane received shutdown signal");
                        break;
                    }
                    Some(request) = lane_rx.recv() => {
                        coordinator.lane_busy.store(true, Ordering::Relaxed);
                        coordinator.run(request.job, request.criteria).await;
                        coordinator.lane_busy.store(false, Ordering::Relaxed);
                    }
                }
            }
            info!("Workflow lane stopped");
        })
    }

    fn spawn_event_loop(
        self: &Arc<Self>,
        mut chain_rx: mpsc::UnboundedReceiver<ChainEvent>,
        mut compute_rx: mpsc::UnboundedReceiver<ComputeEvent>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Workflow event loop received shutdown signal");
                        break;
                    }
                    Some(event) = compute_rx.recv() => {
                        coordinator.handle_compute_event(event).await;
                    }
                    Some(event) = chain_rx.recv() => {
                        coordinator.handle_chain_event(event).await;
                    }
                }
            }
        })
    }

    async fn handle_compute_event(&self, event: ComputeEvent) {
        let ComputeEvent {
            job,
            outcome,
            handled,
        } = event;
        let job_id = job.id;

        let result = match outcome {
            ComputeOutcome::Succeeded => self.on_compute_success(job).await,
            ComputeOutcome::Failed(reason) => self.on_compute_failure(job, &reason).await,
        };

        let reply = result.map_err(|e| {
            error!("Handling compute outcome of job {} failed: {}", job_id, e);
            e.to_string()
        });
        let _ = handled.send(reply);
    }

    async fn handle_chain_event(&self, event: ChainEvent) {
        let result = match event {
            ChainEvent::Completed(job) => self.on_chain_completed(job).await,
            ChainEvent::Failed { job, reason } => self.on_chain_failed(job, &reason).await,
        };
        if let Err(e) = result {
            error!("Handling post-process outcome failed: {}", e);
        }
    }

    /// Body of the lane. Any error fails the job with the error as reason.
    async fn run(&self, mut job: Job, criteria: SearchCriteria) {
        info!("Workflow started for job {}", job.id);

        if let Err(e) = self.query_fetch_submit(&mut job, &criteria).await {
            warn!("Workflow for job {} stopped: {}", job.id, e);
            if job.is_running() {
                if let Err(persist) = self.fail_job(&mut job, &e.to_string()) {
                    error!("Could not mark job {} failed: {}", job.id, persist);
                }
            }
        }
    }

    async fn query_fetch_submit(
        &self,
        job: &mut Job,
        criteria: &SearchCriteria,
    ) -> Result<(), WorkflowError> {
        let urls = collect_image_urls(self.catalog.as_ref(), criteria, self.page_size).await?;
        if urls.is_empty() {
            return Err(WorkflowError::NoImages);
        }
        info!("Catalog returned {} image(s) for job {}", urls.len(), job.id);

        let paths = self.fetcher.fetch_all(urls)?;
        self.fetcher.wait_until_settled().await;
        let stats = self.fetcher.stats();
        debug!(
            "Fetch settled for job {}: {} cached, {} downloaded, {} failed",
            job.id, stats.cache_hits, stats.downloaded, stats.failed
        );

        self.staging.prepare(&paths).await?;

        self.cluster
            .prepare_environment()
            .await
            .map_err(WorkflowError::Environment)?;

        let compute_job_id = self.cluster.submit(job).await?;
        job.start_compute(&compute_job_id)?;
        self.store.update(job)?;
        info!(
            "Job {} submitted to {} compute as {}",
            job.id,
            self.cluster.name(),
            compute_job_id
        );
        Ok(())
    }
}

fn record_finished(job: &Job, outcome: &str) {
    metrics::JOBS_FINISHED.with_label_values(&[outcome]).inc();
    let elapsed = (Utc::now() - job.created_at).num_milliseconds().max(0) as f64 / 1000.0;
    metrics::JOB_DURATION
        .with_label_values(&[outcome])
        .observe(elapsed);
}
