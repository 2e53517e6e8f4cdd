//! Mock artifact publisher for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::job::{Job, JobId};
use crate::publish::{ArtifactPublisher, PublishError};

/// Mock implementation of the [`ArtifactPublisher`] trait.
///
/// Records uploads and hands out `https://publish.test/{id}` links for
/// uploaded jobs only.
#[derive(Debug, Default)]
pub struct MockPublisher {
    uploaded: Arc<RwLock<Vec<JobId>>>,
    fail_uploads: Arc<RwLock<bool>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload fail while set.
    pub async fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.write().await = fail;
    }

    pub async fn uploaded(&self) -> Vec<JobId> {
        self.uploaded.read().await.clone()
    }
}

#[async_trait]
impl ArtifactPublisher for MockPublisher {
    async fn upload(&self, job: &Job) -> Result<(), PublishError> {
        if *self.fail_uploads.read().await {
            return Err(PublishError::Upload {
                job_id: job.id,
                reason: "mock upload failure".to_string(),
            });
        }
        self.uploaded.write().await.push(job.id);
        Ok(())
    }

    async fn access_url(&self, job: &Job) -> Result<String, PublishError> {
        if self.uploaded.read().await.contains(&job.id) {
            Ok(format!("https://publish.test/{}", job.id))
        } else {
            Err(PublishError::NotPublished(job.id))
        }
    }
}
