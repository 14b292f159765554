//! Job management error types.

use thiserror::Error;

use kyoku_models::JobId;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors surfaced to callers of the job manager.
///
/// Pipeline failures are not in this taxonomy: they resolve the job to
/// `Failed` instead of propagating to the submitter.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("job not found: {0}")]
    NotFound(JobId),
}
