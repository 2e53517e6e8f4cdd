//! Image fetcher configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Download limits and cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Directory where downloaded images are cached.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Concurrent transfers allowed against a single host.
    #[serde(default = "default_max_connections")]
    pub max_connections_per_host: usize,

    /// Concurrent transfers allowed in total.
    #[serde(default = "default_max_connections")]
    pub max_connections_total: usize,

    /// Idle connection timeout (seconds).
    #[serde(default = "default_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Whole-request timeout (seconds).
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/mosaic-cache")
}

fn default_max_connections() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    300 // 5 minutes
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_connections_per_host: default_max_connections(),
            max_connections_total: default_max_connections(),
            idle_timeout_secs: default_timeout_secs(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}
