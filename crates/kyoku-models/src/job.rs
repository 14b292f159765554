//! Job lifecycle records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::render::{RenderRequest, RenderSettings};

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// Transitions: `Queued -> Processing -> {Completed, Failed, Cancelled}` and
/// `Queued -> Cancelled`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a concurrency slot
    #[default]
    Queued,
    /// Job pipeline is running
    Processing,
    /// Job finished and its output is available
    Completed,
    /// Job pipeline failed
    Failed,
    /// Job was cancelled before producing output
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One submitted render request and its lifecycle record.
///
/// The manager is the single writer of `status`; the pipeline task owning the
/// job is the single writer of `progress`/`message` (routed through the
/// manager so late updates after a terminal transition are dropped).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), monotone while processing
    #[serde(default)]
    pub progress: u8,

    /// Latest human-readable status line
    #[serde(default)]
    pub message: String,

    /// Path to the source video
    pub input_path: String,

    /// Subtitle timing/content payload, passed through to the overlay
    /// renderer unmodified
    pub subtitle_spec: serde_json::Value,

    /// Effect payload, passed through to the overlay renderer unmodified
    #[serde(default)]
    pub effects_spec: serde_json::Value,

    /// Output encoding settings
    #[serde(default)]
    pub settings: RenderSettings,

    /// Path to the assembled output, set only on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Terminal transition timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set by an external cancel call, observed cooperatively by the
    /// pipeline at batch boundaries
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Job {
    /// Create a new queued job from a validated request.
    pub fn new(request: RenderRequest) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            progress: 0,
            message: "queued".to_string(),
            input_path: request.input_path,
            subtitle_spec: request.subtitle_spec,
            effects_spec: request.effects_spec,
            settings: request.settings,
            output_path: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            cancel_requested: false,
        }
    }

    /// Transition to processing.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.message = "starting".to_string();
    }

    /// Mark the job completed with its output path.
    pub fn complete(&mut self, output_path: impl Into<String>) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = "completed".to_string();
        self.output_path = Some(output_path.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark the job failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.status = JobStatus::Failed;
        self.message = "failed".to_string();
        self.error_message = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Mark the job cancelled.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.message = "cancelled".to_string();
        self.completed_at = Some(Utc::now());
    }

    /// Update progress/message. Progress never moves backwards.
    pub fn set_progress(&mut self, progress: u8, message: impl Into<String>) {
        self.progress = self.progress.max(progress.min(100));
        self.message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderRequest;

    fn request() -> RenderRequest {
        RenderRequest {
            input_path: "/videos/song.mp4".to_string(),
            subtitle_spec: serde_json::json!({"lines": []}),
            effects_spec: serde_json::Value::Null,
            settings: RenderSettings::default(),
        }
    }

    #[test]
    fn test_job_ids_unique() {
        let a = Job::new(request());
        let b = Job::new(request());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new(request());
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.status.is_terminal());

        job.start();
        assert_eq!(job.status, JobStatus::Processing);

        job.complete("/outputs/out.mp4");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_progress_is_monotone() {
        let mut job = Job::new(request());
        job.start();
        job.set_progress(40, "frames 0-99");
        job.set_progress(20, "stale update");
        assert_eq!(job.progress, 40);
        job.set_progress(200, "overflow clamps");
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_job_record_round_trips() {
        let mut job = Job::new(request());
        job.fail("ffmpeg exploded");
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, JobStatus::Failed);
        assert_eq!(back.error_message.as_deref(), Some("ffmpeg exploded"));
    }
}
