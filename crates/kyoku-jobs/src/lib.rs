//! Job lifecycle management for the kyoku render backend.
//!
//! This crate provides:
//! - `JobManager`: admission under a concurrency cap, the job state machine,
//!   on-disk job records, cooperative cancellation
//! - `ProgressBroadcast`: per-job fan-out of progress/terminal events

pub mod broadcast;
pub mod config;
pub mod error;
pub mod manager;
pub mod store;

pub use broadcast::{ProgressBroadcast, SubscriberId};
pub use config::JobsConfig;
pub use error::{JobError, JobResult};
pub use manager::JobManager;
pub use store::JobStore;
