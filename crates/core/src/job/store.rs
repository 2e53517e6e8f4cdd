//! Job storage trait and recovery sweep.

use thiserror::Error;
use tracing::{info, warn};

use super::{Job, JobId, JobStatus};

/// Error type for job operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid job id: {0}")]
    InvalidId(String),

    #[error("Cannot move job {job_id} from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Database error: {0}")]
    Database(String),
}

/// Persistence for jobs. The core never deletes rows.
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    fn add(&self, job: &Job) -> Result<(), JobError>;

    /// Overwrite every mutable field of an existing job.
    fn update(&self, job: &Job) -> Result<(), JobError>;

    /// Load a job by id.
    fn load(&self, id: &JobId) -> Result<Option<Job>, JobError>;

    /// All jobs whose status is in `statuses`, oldest first.
    fn find_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, JobError>;

    /// All jobs in a running status.
    fn find_running(&self) -> Result<Vec<Job>, JobError> {
        self.find_by_status(&JobStatus::RUNNING)
    }
}

/// Move every running job to `Killed`.
///
/// Runs at startup and at graceful shutdown. After a crash the stale running
/// rows stay visible until the next startup.
pub fn kill_running_jobs(store: &dyn JobStore) -> Result<usize, JobError> {
    let running = store.find_running()?;
    if running.is_empty() {
        return Ok(0);
    }

    warn!("Killing {} job(s) left in a running status", running.len());
    let mut killed = 0;
    for mut job in running {
        let previous = job.status();
        job.kill()?;
        store.update(&job)?;
        info!("Killed job {} (was {})", job.id, previous);
        killed += 1;
    }

    Ok(killed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SqliteJobStore;

    #[test]
    fn test_sweep_kills_only_running_jobs() {
        let store = SqliteJobStore::in_memory().unwrap();

        let mut computing = Job::new(None);
        computing.start_compute("c-1").unwrap();
        store.add(&computing).unwrap();

        let mut post = Job::new(None);
        post.start_compute("c-2").unwrap();
        post.start_post_process().unwrap();
        store.add(&post).unwrap();

        let mut done = Job::new(None);
        done.start_compute("c-3").unwrap();
        done.start_post_process().unwrap();
        done.complete().unwrap();
        store.add(&done).unwrap();

        let killed = kill_running_jobs(&store).unwrap();
        assert_eq!(killed, 2);

        let status = |id: &JobId| store.load(id).unwrap().unwrap().status();
        assert_eq!(status(&computing.id), JobStatus::Killed);
        assert_eq!(status(&post.id), JobStatus::Killed);
        assert_eq!(status(&done.id), JobStatus::Completed);
        assert!(store.find_running().unwrap().is_empty());
    }

    #[test]
    fn test_sweep_with_nothing_running() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut failed = Job::new(None);
        failed.fail("nope").unwrap();
        store.add(&failed).unwrap();

        assert_eq!(kill_running_jobs(&store).unwrap(), 0);
        let loaded = store.load(&failed.id).unwrap().unwrap();
        assert_eq!(loaded.status(), JobStatus::Failed);
        assert_eq!(loaded.fail_reason(), Some("nope"));
    }
}
