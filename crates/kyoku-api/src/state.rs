//! Application state.

use std::sync::Arc;

use kyoku_jobs::{JobManager, JobsConfig};
use kyoku_media::{FfmpegFrameCodec, FfmpegOverlayRenderer};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub manager: Arc<JobManager>,
}

impl AppState {
    /// Create application state with the FFmpeg-backed pipeline.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let manager = JobManager::new(
            JobsConfig::from_env(),
            Arc::new(FfmpegFrameCodec::new()),
            Arc::new(FfmpegOverlayRenderer::new()),
        );
        manager.load_existing().await?;

        Ok(Self {
            config,
            manager: Arc::new(manager),
        })
    }

    /// Create state around an existing manager.
    pub fn with_manager(config: ApiConfig, manager: Arc<JobManager>) -> Self {
        Self { config, manager }
    }
}
