//! Image fetching: a bounded-concurrency HTTP downloader and the batch
//! coordinator that feeds it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mosaic_core::fetch::{FetcherConfig, HttpImageDownloader, ImageFetcher};
//!
//! let downloader = Arc::new(HttpImageDownloader::new(&FetcherConfig::default())?);
//! let fetcher = Arc::new(ImageFetcher::new(downloader));
//! fetcher.start();
//!
//! let paths = fetcher.fetch_all(urls)?;
//! fetcher.wait_until_settled().await;
//! ```

mod config;
mod coordinator;
mod downloader;
mod limiter;
mod types;

pub use config::FetcherConfig;
pub use coordinator::ImageFetcher;
pub use downloader::{HttpImageDownloader, ImageDownloader};
pub use limiter::{ConnectionLimiter, ConnectionPermit};
pub use types::{cache_file_name, FetchError, FetchEvent, FetchStart, FetchStats};
