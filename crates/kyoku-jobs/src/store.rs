//! On-disk job records.
//!
//! One JSON file per job under the state directory, written atomically
//! (tmp + rename) so a crash mid-write never corrupts a record. Records are
//! never removed automatically; retention is an external policy.

use std::path::PathBuf;

use tokio::fs;
use tracing::warn;

use kyoku_models::{Job, JobId};

/// Persists job records to the state directory.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write a job record atomically.
    pub async fn save(&self, job: &Job) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(&job.id);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(job)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, payload).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load every parseable record. Corrupt files are skipped with a warning
    /// rather than failing startup.
    pub async fn load_all(&self) -> std::io::Result<Vec<Job>> {
        let mut jobs = Vec::new();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("Skipping corrupt job record {}: {}", path.display(), e),
            }
        }

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyoku_models::{RenderRequest, RenderSettings};

    fn job() -> Job {
        Job::new(RenderRequest {
            input_path: "/videos/song.mp4".to_string(),
            subtitle_spec: serde_json::json!({"lines": []}),
            effects_spec: serde_json::Value::Null,
            settings: RenderSettings::default(),
        })
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());

        let mut a = job();
        a.complete("/outputs/a.mp4");
        let b = job();
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let loaded_a = loaded.iter().find(|j| j.id == a.id).unwrap();
        assert_eq!(loaded_a.output_path.as_deref(), Some("/outputs/a.mp4"));
    }

    #[tokio::test]
    async fn test_load_missing_dir_is_empty() {
        let store = JobStore::new("/nonexistent/kyoku-state");
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        store.save(&job()).await.unwrap();
        fs::write(dir.path().join("broken.json"), b"{nope").await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());

        let mut j = job();
        store.save(&j).await.unwrap();
        j.fail("boom");
        store.save(&j).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].error_message.as_deref(), Some("boom"));
    }
}
