use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

pub use crate::compute::ComputeConfig;
pub use crate::executor::ExecutorConfig;
pub use crate::fetch::FetcherConfig;
pub use crate::monitor::MonitorConfig;
pub use crate::publish::PublishConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mosaic.db")
}

/// Local directories shared by the pipeline stages.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Parent of every job's `{id}_final` staging directory.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    /// Directory the compute job reads its image list from.
    #[serde(default = "default_pic_dir")]
    pub pic_dir: PathBuf,
    /// Name of the image list inside `pic_dir`.
    #[serde(default = "default_part_file_name")]
    pub part_file_name: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            staging_root: default_staging_root(),
            pic_dir: default_pic_dir(),
            part_file_name: default_part_file_name(),
        }
    }
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_pic_dir() -> PathBuf {
    PathBuf::from("/tmp/mosaic-pics")
}

fn default_part_file_name() -> String {
    "part-000000".to_string()
}

/// Catalog service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Catalog service URL (e.g., "http://localhost:8090/catalog")
    #[serde(default = "default_catalog_url")]
    pub url: String,
    /// Locations requested per search page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_catalog_url() -> String {
    "http://localhost:8090/catalog".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_timeout() -> u64 {
    30
}

/// Sanitized config for API responses (local paths of helper programs
/// and the artifact store root are not exposed)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub fetcher: SanitizedFetcherConfig,
    pub executor: SanitizedExecutorConfig,
    pub monitor: MonitorConfig,
    pub compute: SanitizedComputeConfig,
    pub publish: SanitizedPublishConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFetcherConfig {
    pub max_connections_per_host: usize,
    pub max_connections_total: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedExecutorConfig {
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedComputeConfig {
    pub program_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPublishConfig {
    pub base_url: String,
    pub url_ttl_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            catalog: config.catalog.clone(),
            fetcher: SanitizedFetcherConfig {
                max_connections_per_host: config.fetcher.max_connections_per_host,
                max_connections_total: config.fetcher.max_connections_total,
                request_timeout_secs: config.fetcher.request_timeout_secs,
            },
            executor: SanitizedExecutorConfig {
                tick_interval_ms: config.executor.tick_interval_ms,
            },
            monitor: config.monitor.clone(),
            compute: SanitizedComputeConfig {
                program_configured: !config.compute.program.as_os_str().is_empty(),
            },
            publish: SanitizedPublishConfig {
                base_url: config.publish.base_url.clone(),
                url_ttl_secs: config.publish.url_ttl_secs,
            },
        }
    }
}
