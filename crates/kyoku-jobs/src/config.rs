//! Scheduler configuration.

use std::path::PathBuf;

/// Configuration for the job manager and pipeline.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Maximum simultaneously processing jobs
    pub max_concurrent_jobs: usize,
    /// Maximum raw frames resident per job
    pub batch_size: u64,
    /// Root for per-job working directories
    pub work_dir: PathBuf,
    /// Directory for assembled outputs
    pub output_dir: PathBuf,
    /// Directory for on-disk job records
    pub state_dir: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            batch_size: 100,
            work_dir: PathBuf::from("/tmp/kyoku/work"),
            output_dir: PathBuf::from("/tmp/kyoku/outputs"),
            state_dir: PathBuf::from("/tmp/kyoku/jobs"),
        }
    }
}

impl JobsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("KYOKU_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            batch_size: std::env::var("KYOKU_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            work_dir: std::env::var("KYOKU_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("KYOKU_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            state_dir: std::env::var("KYOKU_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
        }
    }
}
