//! Mock compute cluster for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::compute::{ComputeCluster, ComputeError, ComputeStatus};
use crate::job::{Job, JobId};

/// Mock implementation of the [`ComputeCluster`] trait.
///
/// Submitted jobs are `Pending` until a test sets another status. Ids are
/// `mock-compute-1`, `mock-compute-2`, and so on.
#[derive(Debug, Default)]
pub struct MockComputeCluster {
    statuses: Arc<RwLock<HashMap<String, ComputeStatus>>>,
    submissions: Arc<RwLock<Vec<(JobId, String)>>>,
    status_queries: Arc<RwLock<Vec<String>>>,
    environment_error: Arc<RwLock<Option<String>>>,
    submit_error: Arc<RwLock<Option<String>>>,
    prepare_calls: AtomicU64,
    counter: AtomicU64,
}

impl MockComputeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status reported for `compute_job_id`.
    pub async fn set_status(&self, compute_job_id: &str, status: ComputeStatus) {
        self.statuses
            .write()
            .await
            .insert(compute_job_id.to_string(), status);
    }

    /// Make `prepare_environment` fail with `reason` until cleared.
    pub async fn set_environment_error(&self, reason: Option<&str>) {
        *self.environment_error.write().await = reason.map(str::to_string);
    }

    /// Make the next `submit` fail with `reason`.
    pub async fn set_submit_error(&self, reason: &str) {
        *self.submit_error.write().await = Some(reason.to_string());
    }

    /// Job ids and compute ids of every successful submission.
    pub async fn submissions(&self) -> Vec<(JobId, String)> {
        self.submissions.read().await.clone()
    }

    /// Compute id of the most recent submission.
    pub async fn last_compute_id(&self) -> Option<String> {
        self.submissions
            .read()
            .await
            .last()
            .map(|(_, id)| id.clone())
    }

    pub async fn status_queries(&self) -> Vec<String> {
        self.status_queries.read().await.clone()
    }

    pub fn prepare_calls(&self) -> u64 {
        self.prepare_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeCluster for MockComputeCluster {
    fn name(&self) -> &str {
        "mock"
    }

    async fn prepare_environment(&self) -> Result<(), ComputeError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        match self.environment_error.read().await.as_ref() {
            Some(reason) => Err(ComputeError::EnvironmentUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    async fn submit(&self, job: &Job) -> Result<String, ComputeError> {
        if let Some(reason) = self.submit_error.write().await.take() {
            return Err(ComputeError::SubmissionFailed(reason));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock-compute-{}", n);
        self.statuses
            .write()
            .await
            .insert(id.clone(), ComputeStatus::Pending);
        self.submissions.write().await.push((job.id, id.clone()));
        Ok(id)
    }

    async fn status(&self, compute_job_id: &str) -> Result<Option<ComputeStatus>, ComputeError> {
        self.status_queries
            .write()
            .await
            .push(compute_job_id.to_string());
        Ok(self.statuses.read().await.get(compute_job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_assigns_pending_ids() {
        let cluster = MockComputeCluster::new();
        let job = Job::new(None);

        let first = cluster.submit(&job).await.unwrap();
        let second = cluster.submit(&job).await.unwrap();
        assert_eq!(first, "mock-compute-1");
        assert_eq!(second, "mock-compute-2");
        assert_eq!(
            cluster.status(&first).await.unwrap(),
            Some(ComputeStatus::Pending)
        );
        assert_eq!(cluster.submissions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_error_is_one_shot() {
        let cluster = MockComputeCluster::new();
        cluster.set_submit_error("queue full").await;

        assert!(cluster.submit(&Job::new(None)).await.is_err());
        assert!(cluster.submit(&Job::new(None)).await.is_ok());
    }
}
