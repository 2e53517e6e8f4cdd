use std::path::PathBuf;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;

/// Result of asking the downloader to begin a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStart {
    /// The transfer was handed to the transport. Exactly one [`FetchEvent`]
    /// will follow for this URL.
    Started,
    /// A connection ceiling is saturated. Nothing was started.
    Busy,
}

/// Completion of a transfer. Sent exactly once per started transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Succeeded { url: String, path: PathBuf },
    Failed { url: String, reason: String },
}

impl FetchEvent {
    pub fn url(&self) -> &str {
        match self {
            FetchEvent::Succeeded { url, .. } | FetchEvent::Failed { url, .. } => url,
        }
    }
}

/// Errors raised synchronously by the downloader.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Cache directory unusable: {0}")]
    CacheDir(String),
}

/// Counters describing fetch activity since startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchStats {
    /// URLs accepted but not yet resolved.
    pub outstanding: usize,
    /// URLs waiting in the queue for a free connection.
    pub queued: usize,
    pub cache_hits: u64,
    pub downloaded: u64,
    pub failed: u64,
    pub busy_signals: u64,
    /// Times the outstanding count dropped to zero.
    pub settled: u64,
}

/// Cache file name for an image URL: the last path segment, without query.
///
/// Different URLs sharing a base name map to the same file.
pub fn cache_file_name(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    // the parsed path never includes the query string
    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    if name.is_empty() {
        return Err(FetchError::InvalidUrl(url.to_string()));
    }
    Ok(name.to_string())
}
