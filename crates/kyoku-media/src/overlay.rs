//! Overlay renderer: burns timed lyric state onto a single frame.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Boundary to the text-rasterization engine.
///
/// Pure with respect to scheduling: one processed frame per call, a function
/// of (frame, time offset, specs). The specs are opaque to every caller; only
/// implementations interpret them.
#[async_trait]
pub trait OverlayRenderer: Send + Sync {
    async fn render_frame(
        &self,
        frame: &Path,
        time_offset: f64,
        subtitle_spec: &serde_json::Value,
        effects_spec: &serde_json::Value,
        output: &Path,
    ) -> MediaResult<()>;
}

/// Lyric line as understood by the FFmpeg drawtext renderer.
#[derive(Debug, Clone, Deserialize)]
struct LyricLine {
    text: String,
    /// Display window start, seconds
    start: f64,
    /// Display window end, seconds
    end: f64,
}

#[derive(Debug, Deserialize)]
struct SubtitleSpec {
    lines: Vec<LyricLine>,
}

/// Styling knobs pulled from the effects spec; unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
struct EffectStyle {
    #[serde(default = "default_font_size")]
    font_size: u32,
    #[serde(default = "default_font_color")]
    font_color: String,
    #[serde(default = "default_border_color")]
    border_color: String,
    /// Vertical position as a fraction of frame height (0 = top, 1 = bottom)
    #[serde(default = "default_y_position")]
    y_position: f64,
}

fn default_font_size() -> u32 {
    48
}

fn default_font_color() -> String {
    "white".to_string()
}

fn default_border_color() -> String {
    "black".to_string()
}

fn default_y_position() -> f64 {
    0.85
}

impl Default for EffectStyle {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            font_color: default_font_color(),
            border_color: default_border_color(),
            y_position: default_y_position(),
        }
    }
}

/// FFmpeg drawtext-based overlay renderer.
#[derive(Debug, Clone, Default)]
pub struct FfmpegOverlayRenderer {
    runner: FfmpegRunner,
}

impl FfmpegOverlayRenderer {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl OverlayRenderer for FfmpegOverlayRenderer {
    async fn render_frame(
        &self,
        frame: &Path,
        time_offset: f64,
        subtitle_spec: &serde_json::Value,
        effects_spec: &serde_json::Value,
        output: &Path,
    ) -> MediaResult<()> {
        let spec: SubtitleSpec = serde_json::from_value(subtitle_spec.clone())
            .map_err(|e| MediaError::InvalidSubtitleSpec(e.to_string()))?;
        let style: EffectStyle = if effects_spec.is_null() {
            EffectStyle::default()
        } else {
            serde_json::from_value(effects_spec.clone()).unwrap_or_default()
        };

        let active: Vec<&LyricLine> = spec
            .lines
            .iter()
            .filter(|l| l.start <= time_offset && time_offset < l.end)
            .collect();

        if active.is_empty() {
            // Nothing to draw at this offset; the frame passes through as-is.
            fs::copy(frame, output).await?;
            return Ok(());
        }

        let filter = active
            .iter()
            .enumerate()
            .map(|(i, line)| drawtext_filter(line, &style, i))
            .collect::<Vec<_>>()
            .join(",");

        let cmd = FfmpegCommand::new(frame, output).video_filter(filter);
        self.runner.run(&cmd).await
    }
}

/// Build one drawtext filter stage; stacked lines offset downward.
fn drawtext_filter(line: &LyricLine, style: &EffectStyle, stack_index: usize) -> String {
    let y_expr = format!(
        "(h*{:.3})+{}",
        style.y_position,
        stack_index as u32 * (style.font_size + 8)
    );
    format!(
        "drawtext=text='{}':fontsize={}:fontcolor={}:bordercolor={}:borderw=2:x=(w-text_w)/2:y={}",
        escape_drawtext(&line.text),
        style.font_size,
        style.font_color,
        style.border_color,
        y_expr,
    )
}

/// Escape text for use inside a single-quoted drawtext value.
fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\\\\\'"),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> serde_json::Value {
        serde_json::json!({
            "lines": [
                {"text": "first line", "start": 0.0, "end": 2.0},
                {"text": "second line", "start": 1.5, "end": 4.0}
            ]
        })
    }

    #[tokio::test]
    async fn test_passthrough_when_no_active_line() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("in.png");
        let out = dir.path().join("out.png");
        fs::write(&frame, b"not really a png").await.unwrap();

        let renderer = FfmpegOverlayRenderer::new();
        renderer
            .render_frame(&frame, 10.0, &spec(), &serde_json::Value::Null, &out)
            .await
            .unwrap();

        assert_eq!(fs::read(&out).await.unwrap(), b"not really a png");
    }

    #[tokio::test]
    async fn test_invalid_spec_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("in.png");
        let out = dir.path().join("out.png");
        fs::write(&frame, b"x").await.unwrap();

        let renderer = FfmpegOverlayRenderer::new();
        let err = renderer
            .render_frame(
                &frame,
                0.0,
                &serde_json::json!({"not_lines": 1}),
                &serde_json::Value::Null,
                &out,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidSubtitleSpec(_)));
    }

    #[test]
    fn test_drawtext_escaping() {
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
        assert_eq!(escape_drawtext("100%"), "100\\%");
    }

    #[test]
    fn test_stacked_lines_offset() {
        let style = EffectStyle::default();
        let line = LyricLine {
            text: "x".to_string(),
            start: 0.0,
            end: 1.0,
        };
        let first = drawtext_filter(&line, &style, 0);
        let second = drawtext_filter(&line, &style, 1);
        assert_ne!(first, second);
    }
}
