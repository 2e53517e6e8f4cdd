//! Single-image HTTP downloads into the local cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::FetcherConfig;
use super::limiter::{ConnectionLimiter, ConnectionPermit};
use super::types::{cache_file_name, FetchError, FetchEvent, FetchStart};

/// Downloads one image at a time into a cache directory.
///
/// `start_fetch` never blocks on the network. It either hands the transfer
/// to a background task and returns [`FetchStart::Started`], or refuses with
/// [`FetchStart::Busy`] when a connection ceiling is saturated.
pub trait ImageDownloader: Send + Sync {
    /// Cache path for `url`. Pure: does not touch the filesystem.
    fn cached_file(&self, url: &str) -> Result<PathBuf, FetchError>;

    /// Begin fetching `url`. When started, exactly one event is sent on
    /// `events` once the transfer ends.
    fn start_fetch(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Result<FetchStart, FetchError>;
}

/// [`ImageDownloader`] over reqwest with per-host and total ceilings.
pub struct HttpImageDownloader {
    client: Client,
    cache_dir: PathBuf,
    limiter: Arc<ConnectionLimiter>,
}

impl HttpImageDownloader {
    /// Build the HTTP client and make sure the cache directory exists.
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        std::fs::create_dir_all(&config.cache_dir).map_err(|e| {
            FetchError::CacheDir(format!("{}: {}", config.cache_dir.display(), e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            cache_dir: config.cache_dir.clone(),
            limiter: Arc::new(ConnectionLimiter::new(
                config.max_connections_per_host,
                config.max_connections_total,
            )),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn limiter(&self) -> &ConnectionLimiter {
        &self.limiter
    }
}

impl ImageDownloader for HttpImageDownloader {
    fn cached_file(&self, url: &str) -> Result<PathBuf, FetchError> {
        Ok(self.cache_dir.join(cache_file_name(url)?))
    }

    fn start_fetch(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Result<FetchStart, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
        let path = self.cached_file(url)?;

        let Some(permit) = self.limiter.try_acquire(host) else {
            debug!("Cannot download {} right now, too many connections", url);
            return Ok(FetchStart::Busy);
        };

        info!("Downloading {}", url);
        let client = self.client.clone();
        let url = url.to_string();
        tokio::spawn(run_transfer(client, url, path, permit, events));

        Ok(FetchStart::Started)
    }
}

async fn run_transfer(
    client: Client,
    url: String,
    path: PathBuf,
    permit: ConnectionPermit,
    events: mpsc::UnboundedSender<FetchEvent>,
) {
    let partial = partial_path(&path);
    let result = transfer(&client, &url, &partial, &path).await;

    // free the slot before the coordinator reacts to the event
    drop(permit);

    let event = match result {
        Ok(()) => {
            debug!("Downloaded {} to {}", url, path.display());
            FetchEvent::Succeeded { url, path }
        }
        Err(reason) => {
            warn!("Download of {} failed: {}", url, reason);
            if let Err(e) = tokio::fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial file {}: {}", partial.display(), e);
                }
            }
            FetchEvent::Failed { url, reason }
        }
    };

    if events.send(event).is_err() {
        debug!("Fetch event receiver dropped");
    }
}

/// Stream the body into `partial`, then move it to `target`.
async fn transfer(client: &Client, url: &str, partial: &Path, target: &Path) -> Result<(), String> {
    let mut response = client.get(url).send().await.map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status));
    }

    let total = response.content_length().filter(|len| *len > 0);
    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| format!("cannot create {}: {}", partial.display(), e))?;

    let mut received: u64 = 0;
    let mut last_percent: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write failed: {}", e))?;
        received += chunk.len() as u64;

        if let Some(total) = total {
            let percent = received * 100 / total;
            if percent > last_percent + 1 {
                debug!("{}: {}% downloaded", url, percent);
                last_percent = percent;
            }
        }
    }

    file.flush().await.map_err(|e| format!("flush failed: {}", e))?;
    drop(file);

    tokio::fs::rename(partial, target)
        .await
        .map_err(|e| format!("cannot move into cache: {}", e))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn downloader(dir: &TempDir, per_host: usize, total: usize) -> HttpImageDownloader {
        let config = FetcherConfig {
            cache_dir: dir.path().join("cache"),
            max_connections_per_host: per_host,
            max_connections_total: total,
            ..Default::default()
        };
        HttpImageDownloader::new(&config).unwrap()
    }

    #[test]
    fn test_new_creates_cache_dir() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir, 4, 4);
        assert!(downloader.cache_dir().is_dir());
    }

    #[test]
    fn test_cached_file_is_pure() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir, 4, 4);
        let path = downloader
            .cached_file("http://pds.test/a/b/IMG_1.tif?x=1")
            .unwrap();
        assert_eq!(path, dir.path().join("cache").join("IMG_1.tif"));
        assert!(!path.exists());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/c/img.tif")),
            PathBuf::from("/c/img.tif.part")
        );
    }

    #[tokio::test]
    async fn test_busy_when_ceiling_saturated() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir, 1, 1);
        let (tx, _rx) = mpsc::unbounded_channel();

        let _held = downloader.limiter().try_acquire("pds.test").unwrap();
        let start = downloader
            .start_fetch("http://pds.test/img.tif", tx)
            .unwrap();
        assert_eq!(start, FetchStart::Busy);
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_error() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir, 1, 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            downloader.start_fetch("nonsense", tx),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_reports_failed_and_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir, 1, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        // nothing listens on port 9 of the loopback interface
        let url = "http://127.0.0.1:9/missing.tif";
        let start = downloader.start_fetch(url, tx).unwrap();
        assert_eq!(start, FetchStart::Started);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, FetchEvent::Failed { ref url, .. } if url == "http://127.0.0.1:9/missing.tif"));
        assert!(!downloader.cached_file(url).unwrap().exists());
        assert_eq!(downloader.limiter().in_flight(), 0);
    }
}
