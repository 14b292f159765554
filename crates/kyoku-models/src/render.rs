//! Render request and output settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Payload accepted by the submit endpoint.
///
/// `subtitle_spec` and `effects_spec` are opaque to the scheduler; only the
/// overlay renderer interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RenderRequest {
    /// Path to the uploaded source video
    #[validate(length(min = 1, message = "input_path is required"))]
    pub input_path: String,

    /// Subtitle timing/content payload
    pub subtitle_spec: serde_json::Value,

    /// Effect payload
    #[serde(default)]
    pub effects_spec: serde_json::Value,

    /// Output encoding settings
    #[serde(default)]
    pub settings: RenderSettings,
}

impl RenderRequest {
    /// Submit-time validation beyond what `validator` derives can express:
    /// a null subtitle spec means the client forgot the field entirely.
    pub fn check(&self) -> Result<(), String> {
        if let Err(e) = self.validate() {
            return Err(e.to_string());
        }
        if self.subtitle_spec.is_null() {
            return Err("subtitle_spec is required".to_string());
        }
        Ok(())
    }
}

/// Output encoding settings, honored by the assembly step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderSettings {
    /// Output width in pixels (source width when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Output height in pixels (source height when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Output frame rate (source rate when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    /// x264 CRF quality (lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// x264 encoder preset
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Container format / file extension
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_crf() -> u8 {
    18
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_format() -> String {
    "mp4".to_string()
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            fps: None,
            crf: default_crf(),
            preset: default_preset(),
            format: default_format(),
        }
    }
}
