//! Memory-bounded streaming render pipeline.
//!
//! Drives one job through extract -> render -> assemble in sequential batches
//! so the raw-frame working set stays bounded regardless of video length.

pub mod error;
pub mod processor;
pub mod progress;
pub mod workdir;

pub use error::{PipelineError, PipelineResult};
pub use processor::StreamingProcessor;
pub use progress::{CancelFlag, ProgressSink};
pub use workdir::JobWorkspace;
