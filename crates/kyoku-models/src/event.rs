//! Progress events delivered to WebSocket subscribers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Event envelope published per job and forwarded over WebSocket.
///
/// There is no replay buffer: a subscriber that connects after a job finished
/// must fall back to the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Log line with timestamp
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress update (0-100) with the current frame-range message
    Progress { value: u8, message: String },

    /// Processing complete; `output` is the download reference
    Done {
        #[serde(rename = "jobId")]
        job_id: String,
        output: String,
    },

    /// Processing failed or was cancelled
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Create a log event.
    pub fn log(message: impl Into<String>) -> Self {
        JobEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a progress event.
    pub fn progress(value: u8, message: impl Into<String>) -> Self {
        JobEvent::Progress {
            value: value.min(100),
            message: message.into(),
        }
    }

    /// Create a done event.
    pub fn done(job_id: impl Into<String>, output: impl Into<String>) -> Self {
        JobEvent::Done {
            job_id: job_id.into(),
            output: output.into(),
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this event ends the subscription (job reached a terminal state).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done { .. } | JobEvent::Error { .. })
    }
}
