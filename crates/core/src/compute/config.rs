//! Compute backend configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings of the local command backend.
///
/// Each submission runs `program args... <job id> <staging dir>` with
/// `work_dir` as the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default = "default_program")]
    pub program: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_program() -> PathBuf {
    PathBuf::from("/usr/local/bin/mosaic-compute")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/mosaic-compute")
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            work_dir: default_work_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize() {
        let toml = r#"
            program = "/opt/hadoop/bin/hadoop"
            args = ["jar", "mosaic.jar"]
        "#;
        let config: ComputeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.program, PathBuf::from("/opt/hadoop/bin/hadoop"));
        assert_eq!(config.args, vec!["jar", "mosaic.jar"]);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/mosaic-compute"));
    }
}
