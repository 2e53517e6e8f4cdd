//! Mock image downloader for testing.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::fetch::{cache_file_name, FetchError, FetchEvent, FetchStart, ImageDownloader};

struct PendingTransfer {
    url: String,
    path: PathBuf,
    events: mpsc::UnboundedSender<FetchEvent>,
}

#[derive(Default)]
struct State {
    started: Vec<String>,
    pending: Vec<PendingTransfer>,
    auto_complete: bool,
}

/// Mock implementation of [`ImageDownloader`].
///
/// Transfers stay pending until the test completes them, unless
/// auto-complete is on. At most `capacity` transfers may be pending; beyond
/// that `start_fetch` answers [`FetchStart::Busy`].
///
/// # Example
///
/// ```rust,ignore
/// let downloader = Arc::new(MockDownloader::with_capacity(dir.path(), 1));
/// fetcher.fetch_all(urls)?;
/// downloader.wait_for_started(1).await;
/// downloader.complete_all(true);
/// ```
pub struct MockDownloader {
    cache_dir: PathBuf,
    capacity: usize,
    state: Mutex<State>,
}

impl MockDownloader {
    /// Unbounded capacity, manual completion.
    pub fn new(cache_dir: &Path) -> Self {
        Self::with_capacity(cache_dir, usize::MAX)
    }

    pub fn with_capacity(cache_dir: &Path, capacity: usize) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            capacity,
            state: Mutex::new(State::default()),
        }
    }

    /// Complete every transfer successfully as soon as it starts.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().unwrap().auto_complete = enabled;
    }

    /// URLs passed to a successful `start_fetch`, in call order.
    pub fn started_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Finish every pending transfer. Success writes the cache file.
    pub fn complete_all(&self, success: bool) {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        for transfer in pending {
            Self::finish(transfer, success);
        }
    }

    /// Poll until at least `count` transfers have been started.
    pub async fn wait_for_started(&self, count: usize) {
        while self.started_urls().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn finish(transfer: PendingTransfer, success: bool) {
        let event = if success {
            std::fs::write(&transfer.path, transfer.url.as_bytes()).unwrap();
            FetchEvent::Succeeded {
                url: transfer.url,
                path: transfer.path,
            }
        } else {
            FetchEvent::Failed {
                url: transfer.url,
                reason: "HTTP 503 Service Unavailable".to_string(),
            }
        };
        let _ = transfer.events.send(event);
    }
}

impl ImageDownloader for MockDownloader {
    fn cached_file(&self, url: &str) -> Result<PathBuf, FetchError> {
        Ok(self.cache_dir.join(cache_file_name(url)?))
    }

    fn start_fetch(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Result<FetchStart, FetchError> {
        let path = self.cached_file(url)?;
        let mut state = self.state.lock().unwrap();

        if state.pending.len() >= self.capacity {
            return Ok(FetchStart::Busy);
        }

        state.started.push(url.to_string());
        let transfer = PendingTransfer {
            url: url.to_string(),
            path,
            events,
        };

        if state.auto_complete {
            drop(state);
            Self::finish(transfer, true);
        } else {
            state.pending.push(transfer);
        }
        Ok(FetchStart::Started)
    }
}
