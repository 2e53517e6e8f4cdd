//! Workflow coordinator.
//!
//! Drives one job at a time through catalog query, image fetch, staging and
//! compute submission on a single lane, then reacts to compute and
//! post-process events until the job reaches a terminal status.

mod coordinator;
mod error;

pub use coordinator::{WorkflowCoordinator, WorkflowParts, WorkflowStatus};
pub use error::WorkflowError;
