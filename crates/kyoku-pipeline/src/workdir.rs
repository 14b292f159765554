//! Per-job working directories.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use kyoku_models::JobId;

/// Working directory layout for one job, namespaced by job id so concurrent
/// jobs never share paths:
///
/// ```text
/// <work_root>/job-<id>/extract/batch-<start>/   raw frames, one batch at a time
/// <work_root>/job-<id>/rendered/                processed frames, all batches
/// ```
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
    rendered: PathBuf,
    extract: PathBuf,
}

impl JobWorkspace {
    /// Create the workspace directories for a job.
    pub async fn create(work_root: &Path, job_id: &JobId) -> std::io::Result<Self> {
        let root = work_root.join(format!("job-{}", job_id));
        let rendered = root.join("rendered");
        let extract = root.join("extract");
        fs::create_dir_all(&rendered).await?;
        fs::create_dir_all(&extract).await?;
        Ok(Self {
            root,
            rendered,
            extract,
        })
    }

    /// Root of this job's working tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Assembly directory where processed frames accumulate.
    pub fn rendered_dir(&self) -> &Path {
        &self.rendered
    }

    /// Extraction directory for the batch starting at `start`.
    pub fn batch_dir(&self, start: u64) -> PathBuf {
        self.extract.join(format!("batch-{}", start))
    }

    /// Remove the entire working tree. Best-effort: teardown failures are
    /// logged, never propagated over the pipeline result.
    pub async fn cleanup(&self) {
        if let Err(e) = fs::remove_dir_all(&self.root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove job workspace {}: {}", self.root.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_layout() {
        let dir = tempfile::tempdir().unwrap();
        let id = JobId::from_string("test-job");
        let ws = JobWorkspace::create(dir.path(), &id).await.unwrap();

        assert!(ws.rendered_dir().is_dir());
        assert!(ws.batch_dir(100).starts_with(ws.root()));
        assert!(ws.root().ends_with("job-test-job"));

        ws.cleanup().await;
        assert!(!ws.root().exists());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let id = JobId::from_string("gone");
        let ws = JobWorkspace::create(dir.path(), &id).await.unwrap();
        ws.cleanup().await;
        ws.cleanup().await;
    }
}
