pub mod catalog;
pub mod compute;
pub mod config;
pub mod executor;
pub mod fetch;
pub mod job;
pub mod metrics;
pub mod monitor;
pub mod publish;
pub mod staging;
pub mod testing;
pub mod workflow;

pub use catalog::{BoundingBox, Catalog, CatalogError, HttpCatalog, SearchCriteria};
pub use compute::{ComputeCluster, ComputeError, ComputeStatus, LocalCommandCluster};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use executor::{ChainEvent, ExecutorError, ProcessChain, ProcessSupervisor};
pub use fetch::{FetchError, HttpImageDownloader, ImageDownloader, ImageFetcher};
pub use job::{
    kill_running_jobs, Job, JobError, JobId, JobLayout, JobStatus, JobStore, OutputFormat,
    SqliteJobStore,
};
pub use monitor::{spawn_monitor_timer, ComputeEvent, ComputeMonitor, MonitorError};
pub use publish::{ArtifactPublisher, FsArtifactStore, PublishError};
pub use staging::{ImageStaging, StagingError};
pub use workflow::{WorkflowCoordinator, WorkflowError, WorkflowParts, WorkflowStatus};
