//! Post-process stages and the GDAL commands used by the pipeline.

use std::path::{Path, PathBuf};

use crate::job::{Job, JobLayout};

use super::ExecutorError;

/// One external command in a process chain.
///
/// The binary is fixed per stage; only the arguments depend on the job.
pub trait ExecutableStage: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &str;

    /// Binary to run.
    fn program(&self) -> &Path;

    /// Argument list for `job`.
    fn args_for(&self, job: &Job) -> Result<Vec<String>, ExecutorError>;
}

/// Builds the virtual mosaic index from every tile in the staging directory.
///
/// `gdalbuildvrt <staging>/mosaic.vrt <staging>/*.tif`
pub struct BuildVrtStage {
    program: PathBuf,
    layout: JobLayout,
}

impl BuildVrtStage {
    pub fn new(program: impl Into<PathBuf>, layout: JobLayout) -> Self {
        Self {
            program: program.into(),
            layout,
        }
    }
}

impl ExecutableStage for BuildVrtStage {
    fn name(&self) -> &str {
        "gdalbuildvrt"
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn args_for(&self, job: &Job) -> Result<Vec<String>, ExecutorError> {
        let staging = self.layout.staging_dir(&job.id);
        let entries = std::fs::read_dir(&staging).map_err(|e| {
            ExecutorError::stage_arguments(
                self.name(),
                format!("staging directory does not exist: {} ({})", staging.display(), e),
            )
        })?;

        let mut tiles = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| ExecutorError::stage_arguments(self.name(), e.to_string()))?;
            let path = entry.path();
            let is_tile = path
                .to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(".tif");
            if is_tile {
                tiles.push(path.to_string_lossy().into_owned());
            }
        }
        // directory order is unspecified
        tiles.sort();

        let mut args = Vec::with_capacity(tiles.len() + 1);
        args.push(
            self.layout
                .intermediate_artifact(&job.id)
                .to_string_lossy()
                .into_owned(),
        );
        args.extend(tiles);
        Ok(args)
    }
}

/// Converts the virtual mosaic into the job's output format.
///
/// `gdal_translate -of <format> <staging>/mosaic.vrt <staging>/mosaic.<ext>`
pub struct TranslateStage {
    program: PathBuf,
    layout: JobLayout,
}

impl TranslateStage {
    pub fn new(program: impl Into<PathBuf>, layout: JobLayout) -> Self {
        Self {
            program: program.into(),
            layout,
        }
    }
}

impl ExecutableStage for TranslateStage {
    fn name(&self) -> &str {
        "gdal_translate"
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn args_for(&self, job: &Job) -> Result<Vec<String>, ExecutorError> {
        Ok(vec![
            "-of".to_string(),
            job.output_format.as_str().to_string(),
            self.layout
                .intermediate_artifact(&job.id)
                .to_string_lossy()
                .into_owned(),
            self.layout
                .final_artifact(job)
                .to_string_lossy()
                .into_owned(),
        ])
    }
}
