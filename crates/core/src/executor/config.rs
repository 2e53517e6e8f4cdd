//! Post-process executor configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stage binaries and the process liveness ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// How often running stage processes are checked and drained (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Path to gdalbuildvrt.
    #[serde(default = "default_buildvrt_path")]
    pub buildvrt_path: PathBuf,

    /// Path to gdal_translate.
    #[serde(default = "default_translate_path")]
    pub translate_path: PathBuf,
}

fn default_tick_interval() -> u64 {
    10_000 // 10 seconds
}

fn default_buildvrt_path() -> PathBuf {
    PathBuf::from("/usr/bin/gdalbuildvrt")
}

fn default_translate_path() -> PathBuf {
    PathBuf::from("/usr/bin/gdal_translate")
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            buildvrt_path: default_buildvrt_path(),
            translate_path: default_translate_path(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn with_buildvrt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.buildvrt_path = path.into();
        self
    }

    pub fn with_translate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.translate_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.tick_interval_ms, 10_000);
        assert_eq!(config.buildvrt_path, PathBuf::from("/usr/bin/gdalbuildvrt"));
        assert_eq!(config.translate_path, PathBuf::from("/usr/bin/gdal_translate"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ExecutorConfig::default()
            .with_tick_interval_ms(50)
            .with_translate_path("/opt/gdal/bin/gdal_translate");
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(
            config.translate_path,
            PathBuf::from("/opt/gdal/bin/gdal_translate")
        );
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: ExecutorConfig = toml::from_str("tick_interval_ms = 250").unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.buildvrt_path, PathBuf::from("/usr/bin/gdalbuildvrt"));
    }
}
