//! Jobs: the unit of work tracked through the pipeline state machine.

mod layout;
mod sqlite_store;
mod store;
mod types;

pub use layout::JobLayout;
pub use sqlite_store::SqliteJobStore;
pub use store::{kill_running_jobs, JobError, JobStore};
pub use types::{Job, JobId, JobStatus, OutputFormat};
