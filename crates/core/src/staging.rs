//! Local staging of fetched images for the compute stage.
//!
//! The compute job reads a part file listing the image names it should
//! process. Staging is a single-job resource: `prepare` wipes whatever the
//! previous job left behind.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Staging I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The pic directory and the part file inside it.
#[derive(Debug, Clone)]
pub struct ImageStaging {
    pic_dir: PathBuf,
    part_file: PathBuf,
}

impl ImageStaging {
    pub fn new(pic_dir: impl Into<PathBuf>, part_file_name: &str) -> Self {
        let pic_dir = pic_dir.into();
        let part_file = pic_dir.join(part_file_name);
        Self { pic_dir, part_file }
    }

    pub fn pic_dir(&self) -> &Path {
        &self.pic_dir
    }

    pub fn part_file(&self) -> &Path {
        &self.part_file
    }

    /// Empty the pic directory, then write the part file listing the upper
    /// case file name of every image, one per line.
    pub async fn prepare(&self, images: &[PathBuf]) -> Result<PathBuf, StagingError> {
        self.clean().await?;

        let mut file = tokio::fs::File::create(&self.part_file)
            .await
            .map_err(|e| StagingError::io(&self.part_file, e))?;
        for image in images {
            let name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_uppercase())
                .unwrap_or_default();
            debug!("Writing {} to {}", name, self.part_file.display());
            file.write_all(name.as_bytes())
                .await
                .map_err(|e| StagingError::io(&self.part_file, e))?;
            file.write_all(b"\n")
                .await
                .map_err(|e| StagingError::io(&self.part_file, e))?;
        }
        file.flush()
            .await
            .map_err(|e| StagingError::io(&self.part_file, e))?;

        info!(
            "Staged {} image(s) in {}",
            images.len(),
            self.part_file.display()
        );
        Ok(self.part_file.clone())
    }

    /// Remove everything inside the pic directory, creating it if missing.
    pub async fn clean(&self) -> Result<(), StagingError> {
        info!("Clearing pic directory {}", self.pic_dir.display());
        tokio::fs::create_dir_all(&self.pic_dir)
            .await
            .map_err(|e| StagingError::io(&self.pic_dir, e))?;

        let mut entries = tokio::fs::read_dir(&self.pic_dir)
            .await
            .map_err(|e| StagingError::io(&self.pic_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StagingError::io(&self.pic_dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StagingError::io(&path, e))?;
            let removed = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            removed.map_err(|e| StagingError::io(&path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_writes_uppercase_names() {
        let dir = TempDir::new().unwrap();
        let staging = ImageStaging::new(dir.path().join("pics"), "part-000000");

        let images = vec![
            PathBuf::from("/cache/m123_a.tif"),
            PathBuf::from("/cache/Img.IMG"),
        ];
        let part = staging.prepare(&images).await.unwrap();

        let contents = std::fs::read_to_string(part).unwrap();
        assert_eq!(contents, "M123_A.TIF\nIMG.IMG\n");
    }

    #[tokio::test]
    async fn test_prepare_clears_previous_job() {
        let dir = TempDir::new().unwrap();
        let pics = dir.path().join("pics");
        std::fs::create_dir_all(pics.join("leftover")).unwrap();
        std::fs::write(pics.join("old.tif"), b"x").unwrap();

        let staging = ImageStaging::new(&pics, "part-000000");
        staging.prepare(&[]).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(&pics)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("part-000000")]);
    }

    #[tokio::test]
    async fn test_clean_empties_directory() {
        let dir = TempDir::new().unwrap();
        let staging = ImageStaging::new(dir.path().join("pics"), "part-000000");
        staging
            .prepare(&[PathBuf::from("/cache/a.tif")])
            .await
            .unwrap();

        staging.clean().await.unwrap();
        assert!(staging.pic_dir().is_dir());
        assert_eq!(std::fs::read_dir(staging.pic_dir()).unwrap().count(), 0);
    }
}
