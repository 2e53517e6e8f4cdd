//! Artifact store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Directory artifacts are copied into.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Base URL the store is served under.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Prefix of every stored key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Lifetime of generated access URLs (seconds).
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from("/tmp/mosaic-artifacts")
}

fn default_base_url() -> String {
    "http://localhost:8080/artifacts".to_string()
}

fn default_key_prefix() -> String {
    "lmmp-rest-".to_string()
}

fn default_url_ttl() -> u64 {
    300 // 5 minutes
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            base_url: default_base_url(),
            key_prefix: default_key_prefix(),
            url_ttl_secs: default_url_ttl(),
        }
    }
}
