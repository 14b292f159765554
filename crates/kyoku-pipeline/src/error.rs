//! Pipeline error types.

use thiserror::Error;

use kyoku_media::MediaError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Exit reasons for a pipeline run.
///
/// `Cancelled` is a cooperative stop honored at a batch boundary, not a
/// failure; everything else resolves the job to failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("job cancelled")]
    Cancelled,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
