//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// Sink for batch-boundary progress reports.
///
/// The processor takes this capability at invocation time and calls it
/// synchronously between batches; the job manager implements it to update the
/// job record and fan the event out to subscribers.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8, message: &str);
}

/// Shared cancellation flag, polled by the pipeline at batch boundaries.
///
/// There is no preemption: an in-flight batch runs to completion (including
/// its cleanup) before a cancellation takes effect.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
