//! Post-process executor.
//!
//! Runs a fixed chain of external binaries for a job, one stage after the
//! other. A single [`ProcessSupervisor`] owns every live process and, on a
//! fixed tick, reaps finished ones and drains the output of the others.
//! [`ProcessChain`] advances each job's cursor when the supervisor reports
//! an exit and announces the end of the chain with a [`ChainEvent`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mosaic_core::executor::{BuildVrtStage, ProcessChain, ProcessSupervisor, TranslateStage};
//!
//! let supervisor = Arc::new(ProcessSupervisor::new(Duration::from_secs(10)));
//! supervisor.start();
//!
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let chain = Arc::new(ProcessChain::new(
//!     vec![
//!         Arc::new(BuildVrtStage::new("/usr/bin/gdalbuildvrt", layout.clone())),
//!         Arc::new(TranslateStage::new("/usr/bin/gdal_translate", layout)),
//!     ],
//!     supervisor,
//!     events_tx,
//! ));
//! chain.start();
//! chain.run_for(&job)?;
//! ```

mod chain;
mod config;
mod error;
mod process;
mod stages;
mod supervisor;

pub use chain::{ChainEvent, ProcessChain};
pub use config::ExecutorConfig;
pub use error::ExecutorError;
pub use process::RunningProcess;
pub use stages::{BuildVrtStage, ExecutableStage, TranslateStage};
pub use supervisor::{ProcessExit, ProcessSupervisor};
