//! Directory-backed artifact store.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::job::{Job, JobLayout};

use super::{ArtifactPublisher, PublishConfig, PublishError};

/// Copies final artifacts to `{root}/{key_prefix}{id}.{ext}` and issues
/// expiring links under `base_url`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    config: PublishConfig,
    layout: JobLayout,
}

impl FsArtifactStore {
    pub fn new(config: PublishConfig, layout: JobLayout) -> Self {
        Self { config, layout }
    }

    /// Storage key of a job's artifact.
    pub fn key(&self, job: &Job) -> String {
        format!(
            "{}{}.{}",
            self.config.key_prefix,
            job.id,
            job.output_format.extension()
        )
    }

    pub fn stored_path(&self, job: &Job) -> PathBuf {
        self.config.root.join(self.key(job))
    }

    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.config.url_ttl_secs)
    }
}

#[async_trait]
impl ArtifactPublisher for FsArtifactStore {
    async fn upload(&self, job: &Job) -> Result<(), PublishError> {
        let source = self.layout.final_artifact(job);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(PublishError::MissingArtifact {
                job_id: job.id,
                path: source.display().to_string(),
            });
        }

        let upload_err = |e: std::io::Error| PublishError::Upload {
            job_id: job.id,
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.config.root)
            .await
            .map_err(upload_err)?;

        let target = self.stored_path(job);
        let bytes = tokio::fs::copy(&source, &target)
            .await
            .map_err(upload_err)?;
        info!(
            "Published artifact for job {} to {} ({} bytes)",
            job.id,
            target.display(),
            bytes
        );
        Ok(())
    }

    async fn access_url(&self, job: &Job) -> Result<String, PublishError> {
        let target = self.stored_path(job);
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(PublishError::NotPublished(job.id));
        }

        let expires = Utc::now().timestamp() + self.config.url_ttl_secs as i64;
        Ok(format!(
            "{}/{}?expires={}",
            self.config.base_url.trim_end_matches('/'),
            self.key(job),
            expires
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FsArtifactStore {
        let config = PublishConfig {
            root: dir.path().join("store"),
            base_url: "https://maps.test/files/".to_string(),
            ..Default::default()
        };
        FsArtifactStore::new(config, JobLayout::new(dir.path().join("staging")))
    }

    fn write_final(dir: &TempDir, job: &Job) {
        let layout = JobLayout::new(dir.path().join("staging"));
        let path = layout.final_artifact(job);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"mosaic").unwrap();
    }

    #[tokio::test]
    async fn test_upload_copies_under_prefixed_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let job = Job::new(None);
        write_final(&dir, &job);

        tokio_test::assert_ok!(store.upload(&job).await);

        let expected = dir
            .path()
            .join("store")
            .join(format!("lmmp-rest-{}.tiff", job.id));
        assert_eq!(store.stored_path(&job), expected);
        assert_eq!(std::fs::read(expected).unwrap(), b"mosaic");
    }

    #[tokio::test]
    async fn test_upload_without_artifact_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let job = Job::new(Some("png"));

        assert!(matches!(
            store.upload(&job).await,
            Err(PublishError::MissingArtifact { .. })
        ));
    }

    #[tokio::test]
    async fn test_access_url_expires_in_the_future() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let job = Job::new(None);
        write_final(&dir, &job);
        store.upload(&job).await.unwrap();

        let url = store.access_url(&job).await.unwrap();
        let prefix = format!("https://maps.test/files/lmmp-rest-{}.tiff?expires=", job.id);
        assert!(url.starts_with(&prefix), "unexpected url {}", url);

        let expires: i64 = url[prefix.len()..].parse().unwrap();
        let now = Utc::now().timestamp();
        assert!(expires > now && expires <= now + 300);
    }

    #[tokio::test]
    async fn test_access_url_requires_upload() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.access_url(&Job::new(None)).await,
            Err(PublishError::NotPublished(_))
        ));
    }
}
