//! Batch image fetching with backpressure.
//!
//! Callers hand over a batch of URLs and get the cache paths back
//! immediately. A single pump task owns the queue drain: it is woken by new
//! batches and by every download completion, so draining never runs twice
//! at once. URLs refused with a busy signal go back on the queue and are
//! retried when the next completion wakes the pump.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::metrics;

use super::downloader::ImageDownloader;
use super::types::{FetchError, FetchEvent, FetchStart, FetchStats};

struct PumpChannels {
    nudge_rx: mpsc::UnboundedReceiver<()>,
    events_rx: mpsc::UnboundedReceiver<FetchEvent>,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    downloaded: AtomicU64,
    failed: AtomicU64,
    busy_signals: AtomicU64,
    settled: AtomicU64,
}

/// Ensures batches of image URLs end up in the local cache.
pub struct ImageFetcher {
    downloader: Arc<dyn ImageDownloader>,
    queue: Mutex<VecDeque<String>>,
    outstanding: watch::Sender<usize>,
    counters: Counters,

    nudge_tx: mpsc::UnboundedSender<()>,
    events_tx: mpsc::UnboundedSender<FetchEvent>,
    channels: Mutex<Option<PumpChannels>>,

    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ImageFetcher {
    pub fn new(downloader: Arc<dyn ImageDownloader>) -> Self {
        let (nudge_tx, nudge_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            downloader,
            queue: Mutex::new(VecDeque::new()),
            outstanding,
            counters: Counters::default(),
            nudge_tx,
            events_tx,
            channels: Mutex::new(Some(PumpChannels {
                nudge_rx,
                events_rx,
            })),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Spawn the pump task. Batches submitted earlier start draining now.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Image fetcher already running");
            return;
        }

        let channels = self.channels.lock().ok().and_then(|mut c| c.take());
        let Some(PumpChannels {
            mut nudge_rx,
            mut events_rx,
        }) = channels
        else {
            warn!("Image fetcher cannot be restarted");
            return;
        };

        let fetcher = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Image fetcher started");
            fetcher.drain().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Image fetcher received shutdown signal");
                        break;
                    }
                    Some(event) = events_rx.recv() => {
                        fetcher.on_fetched(event);
                        fetcher.drain().await;
                    }
                    Some(()) = nudge_rx.recv() => {
                        fetcher.drain().await;
                    }
                }
            }
            info!("Image fetcher stopped");
        });
    }

    /// Stop the pump. Transfers already running finish but are not tracked.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Accept a batch and return the cache path of every URL.
    ///
    /// Returns before anything is downloaded. Fails without queueing
    /// anything if any URL cannot be mapped to a cache file.
    pub fn fetch_all(&self, urls: Vec<String>) -> Result<Vec<PathBuf>, FetchError> {
        let paths = urls
            .iter()
            .map(|url| self.downloader.cached_file(url))
            .collect::<Result<Vec<_>, _>>()?;

        if urls.is_empty() {
            return Ok(paths);
        }

        let count = urls.len();
        self.outstanding.send_modify(|n| *n += count);
        self.queue().extend(urls);
        debug!("Accepted {} image URL(s)", count);

        let _ = self.nudge_tx.send(());
        Ok(paths)
    }

    /// True while any accepted URL is unresolved.
    pub fn is_fetching(&self) -> bool {
        *self.outstanding.borrow() > 0
    }

    /// Wait until every accepted URL is resolved by cache hit, download or
    /// failure.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.outstanding.subscribe();
        // the sender lives in self, so this cannot observe a closed channel
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            outstanding: *self.outstanding.borrow(),
            queued: self.queue().len(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            downloaded: self.counters.downloaded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            busy_signals: self.counters.busy_signals.load(Ordering::Relaxed),
            settled: self.counters.settled.load(Ordering::Relaxed),
        }
    }

    fn on_fetched(&self, event: FetchEvent) {
        match &event {
            FetchEvent::Succeeded { url, .. } => {
                debug!("Fetched {}", url);
                self.counters.downloaded.fetch_add(1, Ordering::Relaxed);
                metrics::IMAGE_FETCHES.with_label_values(&["downloaded"]).inc();
            }
            FetchEvent::Failed { url, reason } => {
                warn!("Could not fetch {}: {}", url, reason);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::IMAGE_FETCHES.with_label_values(&["failed"]).inc();
            }
        }
        self.settle();
    }

    fn settle(&self) {
        let mut reached_zero = false;
        self.outstanding.send_modify(|n| {
            *n = n.saturating_sub(1);
            reached_zero = *n == 0;
        });
        if reached_zero {
            self.counters.settled.fetch_add(1, Ordering::Relaxed);
            info!("All queued images resolved");
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pop(&self) -> Option<String> {
        self.queue().pop_front()
    }

    /// Empty the queue once. Busy URLs are put back afterwards.
    async fn drain(&self) {
        let mut busy = Vec::new();

        while let Some(url) = self.pop() {
            let path = match self.downloader.cached_file(&url) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Dropping {}: {}", url, e);
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    self.settle();
                    continue;
                }
            };

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("{} already cached at {}", url, path.display());
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                metrics::IMAGE_FETCHES.with_label_values(&["cache_hit"]).inc();
                self.settle();
                continue;
            }

            match self.downloader.start_fetch(&url, self.events_tx.clone()) {
                Ok(FetchStart::Started) => {}
                Ok(FetchStart::Busy) => {
                    self.counters.busy_signals.fetch_add(1, Ordering::Relaxed);
                    metrics::DOWNLOAD_BUSY_SIGNALS.inc();
                    busy.push(url);
                }
                Err(e) => {
                    warn!("Could not start fetching {}: {}", url, e);
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    metrics::IMAGE_FETCHES.with_label_values(&["failed"]).inc();
                    self.settle();
                }
            }
        }

        if !busy.is_empty() {
            debug!("{} URL(s) waiting for a free connection", busy.len());
            self.queue().extend(busy);
        }
    }
}
