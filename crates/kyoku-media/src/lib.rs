//! FFmpeg CLI wrapper for the kyoku render pipeline.
//!
//! This crate is the boundary to the codec engine: probing a source video,
//! extracting contiguous frame ranges, burning lyric overlays onto single
//! frames, and assembling rendered frames plus the original audio into an
//! encoded output. The scheduler crates only see the `FrameCodec` and
//! `OverlayRenderer` traits.

pub mod codec;
pub mod command;
pub mod error;
pub mod overlay;
pub mod probe;

pub use codec::{frame_file_name, FfmpegFrameCodec, FrameCodec};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use overlay::{FfmpegOverlayRenderer, OverlayRenderer};
pub use probe::{probe_video, VideoInfo};
