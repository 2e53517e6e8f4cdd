//! Compute backend that runs a local command per job.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::job::{Job, JobLayout};

use super::config::ComputeConfig;
use super::{ComputeCluster, ComputeError, ComputeStatus};

enum Tracked {
    Running(Child),
    Finished(ComputeStatus),
}

/// Runs the configured program for each submitted job and reports its exit.
pub struct LocalCommandCluster {
    config: ComputeConfig,
    layout: JobLayout,
    jobs: Mutex<HashMap<String, Tracked>>,
}

impl LocalCommandCluster {
    pub fn new(config: ComputeConfig, layout: JobLayout) -> Self {
        Self {
            config,
            layout,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ComputeCluster for LocalCommandCluster {
    fn name(&self) -> &str {
        "local"
    }

    async fn prepare_environment(&self) -> Result<(), ComputeError> {
        info!("Preparing compute work directory {}", self.config.work_dir.display());
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| {
                ComputeError::EnvironmentUnavailable(format!(
                    "{}: {}",
                    self.config.work_dir.display(),
                    e
                ))
            })?;

        if self.config.program.is_absolute()
            && !tokio::fs::try_exists(&self.config.program)
                .await
                .unwrap_or(false)
        {
            return Err(ComputeError::EnvironmentUnavailable(format!(
                "program not found: {}",
                self.config.program.display()
            )));
        }
        Ok(())
    }

    async fn submit(&self, job: &Job) -> Result<String, ComputeError> {
        let staging = self.layout.staging_dir(&job.id);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| ComputeError::SubmissionFailed(e.to_string()))?;

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(job.id.to_string())
            .arg(&staging)
            .current_dir(&self.config.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ComputeError::SubmissionFailed(format!(
                    "{}: {}",
                    self.config.program.display(),
                    e
                ))
            })?;

        let compute_id = format!("local_{}", Uuid::new_v4().simple());
        info!("Submitted compute job {} for job {}", compute_id, job.id);
        self.jobs
            .lock()
            .await
            .insert(compute_id.clone(), Tracked::Running(child));
        Ok(compute_id)
    }

    async fn status(&self, compute_job_id: &str) -> Result<Option<ComputeStatus>, ComputeError> {
        let mut jobs = self.jobs.lock().await;
        let Some(tracked) = jobs.get_mut(compute_job_id) else {
            return Ok(None);
        };

        let child = match tracked {
            Tracked::Finished(status) => return Ok(Some(status.clone())),
            Tracked::Running(child) => child,
        };

        let exit = child
            .try_wait()
            .map_err(|e| ComputeError::StatusQuery(e.to_string()))?;
        let status = match exit {
            None => return Ok(Some(ComputeStatus::Pending)),
            Some(exit) if exit.success() => ComputeStatus::Succeeded,
            Some(exit) => {
                warn!("Compute job {} exited with {}", compute_job_id, exit);
                ComputeStatus::Failed(format!("compute command exited with {}", exit))
            }
        };

        *tracked = Tracked::Finished(status.clone());
        Ok(Some(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cluster(dir: &TempDir, script: &str) -> LocalCommandCluster {
        let config = ComputeConfig {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string(), "compute".to_string()],
            work_dir: dir.path().join("work"),
        };
        LocalCommandCluster::new(config, JobLayout::new(dir.path()))
    }

    async fn wait_finished(cluster: &LocalCommandCluster, id: &str) -> ComputeStatus {
        for _ in 0..500 {
            let status = cluster.status(id).await.unwrap().unwrap();
            if status.is_finished() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("compute job did not finish");
    }

    #[tokio::test]
    async fn test_successful_command() {
        let dir = TempDir::new().unwrap();
        // $1 is the job id, $2 the staging directory
        let cluster = cluster(&dir, "touch \"$2/tile.tif\"");
        cluster.prepare_environment().await.unwrap();

        let job = Job::new(None);
        let id = cluster.submit(&job).await.unwrap();
        assert!(id.starts_with("local_"));

        assert_eq!(wait_finished(&cluster, &id).await, ComputeStatus::Succeeded);
        let layout = JobLayout::new(dir.path());
        assert!(layout.staging_dir(&job.id).join("tile.tif").exists());
    }

    #[tokio::test]
    async fn test_failing_command_reports_reason() {
        let dir = TempDir::new().unwrap();
        let cluster = cluster(&dir, "exit 2");
        cluster.prepare_environment().await.unwrap();

        let id = cluster.submit(&Job::new(None)).await.unwrap();
        match wait_finished(&cluster, &id).await {
            ComputeStatus::Failed(reason) => assert!(reason.contains("exit")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let dir = TempDir::new().unwrap();
        let cluster = cluster(&dir, "true");
        assert!(cluster.status("local_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_program_fails_environment() {
        let dir = TempDir::new().unwrap();
        let config = ComputeConfig {
            program: PathBuf::from("/nonexistent/compute"),
            args: Vec::new(),
            work_dir: dir.path().join("work"),
        };
        let cluster = LocalCommandCluster::new(config, JobLayout::new(dir.path()));
        assert!(matches!(
            cluster.prepare_environment().await,
            Err(ComputeError::EnvironmentUnavailable(_))
        ));
    }
}
