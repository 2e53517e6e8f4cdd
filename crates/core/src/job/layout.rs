//! On-disk locations derived from a job.

use std::path::{Path, PathBuf};

use super::{Job, JobId};

const INTERMEDIATE_NAME: &str = "mosaic.vrt";
const FINAL_STEM: &str = "mosaic";

/// Computes a job's staging directory and artifact paths.
///
/// Paths are pure functions of the job id and output format and are never
/// stored.
#[derive(Debug, Clone)]
pub struct JobLayout {
    staging_root: PathBuf,
}

impl JobLayout {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Directory holding the compute output tiles and the post-process artifacts.
    pub fn staging_dir(&self, id: &JobId) -> PathBuf {
        self.staging_root.join(format!("{}_final", id))
    }

    /// Virtual mosaic index built by the first post-process stage.
    pub fn intermediate_artifact(&self, id: &JobId) -> PathBuf {
        self.staging_dir(id).join(INTERMEDIATE_NAME)
    }

    /// Final artifact, named with the extension of the job's output format.
    pub fn final_artifact(&self, job: &Job) -> PathBuf {
        self.staging_dir(&job.id).join(format!(
            "{}.{}",
            FINAL_STEM,
            job.output_format.extension()
        ))
    }
}
