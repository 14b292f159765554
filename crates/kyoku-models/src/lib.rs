//! Shared data models for the kyoku render backend.
//!
//! Types in this crate are serialized both to the HTTP/WS API and to the
//! on-disk job records, so changes here are wire-format changes.

pub mod event;
pub mod job;
pub mod render;

pub use event::JobEvent;
pub use job::{Job, JobId, JobStatus};
pub use render::{RenderRequest, RenderSettings};
