//! Frame codec gateway: probe, extract, assemble.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use kyoku_models::RenderSettings;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Frame-numbered file name for a global frame index.
///
/// Both extraction and assembly use the same naming so the image2 sequence in
/// the assembly directory stays contiguous and ordered across batches.
pub fn frame_file_name(index: u64) -> String {
    format!("{:08}.png", index)
}

/// Boundary to the video codec engine.
///
/// All calls are blocking from the pipeline's point of view; any failure is
/// fatal for the job.
#[async_trait]
pub trait FrameCodec: Send + Sync {
    /// Probe the source for frame count, rate and duration.
    async fn probe(&self, input: &Path) -> MediaResult<VideoInfo>;

    /// Extract frames `[start, end)` into `dest_dir`, one numbered PNG per
    /// frame, named by global frame index. Returns the paths in index order.
    async fn extract_frames(
        &self,
        input: &Path,
        dest_dir: &Path,
        start: u64,
        end: u64,
    ) -> MediaResult<Vec<PathBuf>>;

    /// Assemble the full numbered frame sequence in `frames_dir` with the
    /// audio track of `audio_source` into `output`, honoring `settings`.
    async fn assemble(
        &self,
        frames_dir: &Path,
        audio_source: &Path,
        output: &Path,
        fps: f64,
        settings: &RenderSettings,
    ) -> MediaResult<()>;
}

/// FFmpeg-backed frame codec.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameCodec {
    runner: FfmpegRunner,
}

impl FfmpegFrameCodec {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new(),
        }
    }

    /// Apply a hard timeout to every FFmpeg invocation.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl FrameCodec for FfmpegFrameCodec {
    async fn probe(&self, input: &Path) -> MediaResult<VideoInfo> {
        probe_video(input).await
    }

    async fn extract_frames(
        &self,
        input: &Path,
        dest_dir: &Path,
        start: u64,
        end: u64,
    ) -> MediaResult<Vec<PathBuf>> {
        if end <= start {
            return Ok(Vec::new());
        }
        fs::create_dir_all(dest_dir).await?;

        let pattern = dest_dir.join("%08d.png");
        // select is inclusive on both ends, our range is half-open
        let filter = format!("select='between(n\\,{}\\,{})'", start, end - 1);

        let cmd = FfmpegCommand::new(input, &pattern)
            .video_filter(filter)
            .output_arg("-vsync")
            .output_arg("0")
            .output_arg("-start_number")
            .output_arg(start.to_string());

        self.runner.run(&cmd).await?;

        let mut frames: Vec<PathBuf> = (start..end)
            .map(|i| dest_dir.join(frame_file_name(i)))
            .collect();
        // The tail batch of a stream whose probed frame count over-estimates
        // (duration * fps rounding) may come up short; only the frames that
        // actually exist are rendered.
        let mut existing = Vec::with_capacity(frames.len());
        for frame in frames.drain(..) {
            if fs::try_exists(&frame).await? {
                existing.push(frame);
            }
        }
        if existing.is_empty() {
            return Err(MediaError::InvalidVideo(format!(
                "extraction produced no frames for range {}..{}",
                start, end
            )));
        }
        debug!(
            "Extracted {} frames ({}..{}) to {}",
            existing.len(),
            start,
            end,
            dest_dir.display()
        );
        Ok(existing)
    }

    async fn assemble(
        &self,
        frames_dir: &Path,
        audio_source: &Path,
        output: &Path,
        fps: f64,
        settings: &RenderSettings,
    ) -> MediaResult<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let pattern = frames_dir.join("%08d.png");
        let out_fps = settings.fps.unwrap_or(fps);

        let mut cmd = FfmpegCommand::new(&pattern, output)
            .input_framerate(out_fps)
            .input_start_number(0)
            // audio comes from the original source; second -i precedes all
            // output options
            .second_input(audio_source)
            .output_args(["-map", "0:v", "-map", "1:a?"])
            .video_codec("libx264")
            .crf(settings.crf)
            .preset(settings.preset.clone())
            .pixel_format("yuv420p")
            .audio_codec("aac")
            .output_arg("-shortest");

        if let (Some(w), Some(h)) = (settings.width, settings.height) {
            cmd = cmd.video_filter(format!("scale={}:{}", w, h));
        }

        self.runner.run(&cmd).await
    }
}
