//! The extract -> render -> assemble loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info};

use kyoku_media::{FrameCodec, OverlayRenderer};
use kyoku_models::Job;

use crate::error::{PipelineError, PipelineResult};
use crate::progress::{CancelFlag, ProgressSink};
use crate::workdir::JobWorkspace;

/// Executes one job's pipeline with a bounded raw-frame working set.
///
/// Invariant: at any instant at most `batch_size` raw extracted frames exist
/// for a job, independent of total video length. Processed frames accumulate
/// in the assembly directory and are streamed into the encode by the codec,
/// never re-read here.
pub struct StreamingProcessor {
    codec: Arc<dyn FrameCodec>,
    renderer: Arc<dyn OverlayRenderer>,
    batch_size: u64,
    work_root: PathBuf,
}

impl StreamingProcessor {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        renderer: Arc<dyn OverlayRenderer>,
        batch_size: u64,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            codec,
            renderer,
            batch_size: batch_size.max(1),
            work_root: work_root.into(),
        }
    }

    /// Run the full pipeline for `job`, writing the encoded result to
    /// `output_path`.
    ///
    /// Every exit path tears down the job's working directories; on success
    /// the only artifact left behind is the output file.
    pub async fn run(
        &self,
        job: &Job,
        output_path: &Path,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> PipelineResult<PathBuf> {
        let workspace = JobWorkspace::create(&self.work_root, &job.id).await?;
        let result = self
            .run_inner(job, &workspace, output_path, cancel, sink)
            .await;
        workspace.cleanup().await;
        if result.is_err() {
            // Partial outputs are never exposed.
            let _ = fs::remove_file(output_path).await;
        }
        result
    }

    async fn run_inner(
        &self,
        job: &Job,
        workspace: &JobWorkspace,
        output_path: &Path,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> PipelineResult<PathBuf> {
        let input = PathBuf::from(&job.input_path);
        let info = self.codec.probe(&input).await?;
        let total = info.frame_count;

        info!(
            job_id = %job.id,
            frames = total,
            fps = info.fps,
            "Starting render pipeline"
        );

        let mut start = 0u64;
        while start < total {
            if cancel.is_cancelled() {
                info!(job_id = %job.id, frame = start, "Cancellation observed at batch boundary");
                return Err(PipelineError::Cancelled);
            }

            let end = (start + self.batch_size).min(total);
            let batch_dir = workspace.batch_dir(start);

            let frames = self
                .codec
                .extract_frames(&input, &batch_dir, start, end)
                .await?;

            for frame in &frames {
                let index = frame_index(frame)?;
                let time_offset = index as f64 / info.fps;
                let output = workspace.rendered_dir().join(
                    frame
                        .file_name()
                        .ok_or_else(|| invalid_frame_path(frame))?,
                );
                self.renderer
                    .render_frame(frame, time_offset, &job.subtitle_spec, &job.effects_spec, &output)
                    .await?;
            }

            // The raw batch must never outlive its render pass.
            fs::remove_dir_all(&batch_dir).await?;

            let percent = (end * 100 / total) as u8;
            let message = format!("processed frames {}-{} of {}", start, end - 1, total);
            debug!(job_id = %job.id, percent, "{}", message);
            sink.report(percent, &message).await;

            start = end;
        }

        self.codec
            .assemble(
                workspace.rendered_dir(),
                &input,
                output_path,
                info.fps,
                &job.settings,
            )
            .await?;

        info!(job_id = %job.id, output = %output_path.display(), "Render pipeline finished");
        Ok(output_path.to_path_buf())
    }
}

/// Recover the global frame index from a numbered frame file name.
fn frame_index(frame: &Path) -> PipelineResult<u64> {
    frame
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| invalid_frame_path(frame))
}

fn invalid_frame_path(frame: &Path) -> PipelineError {
    PipelineError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("unexpected frame file name: {}", frame.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_parsing() {
        assert_eq!(frame_index(Path::new("/w/rendered/00001247.png")).unwrap(), 1247);
        assert!(frame_index(Path::new("/w/rendered/cover.jpg")).is_err());
    }
}
