//! Job admission, lifecycle and terminal transitions.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use kyoku_media::{FrameCodec, OverlayRenderer};
use kyoku_models::{Job, JobId, JobStatus, RenderRequest};
use kyoku_pipeline::{CancelFlag, ProgressSink, StreamingProcessor};

use crate::broadcast::ProgressBroadcast;
use crate::config::JobsConfig;
use crate::error::{JobError, JobResult};
use crate::store::JobStore;

/// Owns job identity, the state machine, admission under the concurrency cap
/// and cancellation signaling.
///
/// Jobs beyond the cap wait in FIFO order. Every path out of `Processing`
/// funnels through [`Inner::finish`], the single place that records the
/// terminal state, releases the slot and re-runs admission.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: JobsConfig,
    codec: Arc<dyn FrameCodec>,
    renderer: Arc<dyn OverlayRenderer>,
    store: JobStore,
    broadcast: ProgressBroadcast,
    /// Process-wide job table; entries are added by submit and never removed.
    jobs: RwLock<HashMap<JobId, Job>>,
    /// Admission state: FIFO queue plus the running count. `running` is only
    /// mutated while holding this lock, which is never held across another
    /// lock acquisition.
    sched: Mutex<SchedState>,
    /// Cooperative cancel flags for jobs with a live pipeline.
    cancel_flags: RwLock<HashMap<JobId, CancelFlag>>,
}

#[derive(Default)]
struct SchedState {
    queue: VecDeque<JobId>,
    running: usize,
}

/// How a pipeline run ended.
enum Outcome {
    Completed(PathBuf),
    Cancelled,
    Failed(String),
}

impl JobManager {
    pub fn new(
        config: JobsConfig,
        codec: Arc<dyn FrameCodec>,
        renderer: Arc<dyn OverlayRenderer>,
    ) -> Self {
        let store = JobStore::new(&config.state_dir);
        Self {
            inner: Arc::new(Inner {
                config,
                codec,
                renderer,
                store,
                broadcast: ProgressBroadcast::new(),
                jobs: RwLock::new(HashMap::new()),
                sched: Mutex::new(SchedState::default()),
                cancel_flags: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Load persisted records so status queries survive a restart. Pipelines
    /// do not survive the process, so loaded non-terminal jobs are failed.
    pub async fn load_existing(&self) -> std::io::Result<usize> {
        let records = self.inner.store.load_all().await?;
        let count = records.len();

        let mut jobs = self.inner.jobs.write().await;
        for mut job in records {
            if !job.status.is_terminal() {
                job.fail("interrupted by restart");
                if let Err(e) = self.inner.store.save(&job).await {
                    warn!(job_id = %job.id, "Failed to persist restart-failed record: {}", e);
                }
            }
            jobs.insert(job.id.clone(), job);
        }

        if count > 0 {
            info!("Loaded {} job records", count);
        }
        Ok(count)
    }

    /// Validate and enqueue a render request. Returns immediately with the
    /// new job id; admission happens asynchronously.
    pub async fn submit(&self, request: RenderRequest) -> JobResult<JobId> {
        request.check().map_err(JobError::InvalidRequest)?;

        let job = Job::new(request);
        let id = job.id.clone();

        if let Err(e) = self.inner.store.save(&job).await {
            warn!(job_id = %id, "Failed to persist job record: {}", e);
        }
        self.inner.jobs.write().await.insert(id.clone(), job);
        self.inner.sched.lock().await.queue.push_back(id.clone());

        info!(job_id = %id, "Job submitted");
        self.inner.clone().admit_next().await;
        Ok(id)
    }

    /// Read-only snapshot of one job.
    pub async fn status(&self, id: &JobId) -> JobResult<Job> {
        self.inner
            .jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    /// Snapshots of all known jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Request cancellation. Queued jobs cancel immediately; processing jobs
    /// stop cooperatively at the next batch boundary. Returns false for
    /// terminal or unknown jobs.
    pub async fn cancel(&self, id: &JobId) -> bool {
        let (accepted, record) = {
            let mut jobs = self.inner.jobs.write().await;
            match jobs.get_mut(id) {
                None => (false, None),
                Some(job) if job.status.is_terminal() => (false, None),
                Some(job) if job.status == JobStatus::Queued => {
                    // Never admitted: the stale queue entry is skipped later.
                    job.cancel_requested = true;
                    job.cancel();
                    (true, Some(job.clone()))
                }
                Some(job) => {
                    job.cancel_requested = true;
                    (true, Some(job.clone()))
                }
            }
        };

        let Some(record) = record else {
            return accepted;
        };

        if record.status == JobStatus::Cancelled {
            info!(job_id = %id, "Cancelled queued job");
            if let Err(e) = self.inner.store.save(&record).await {
                warn!(job_id = %id, "Failed to persist cancelled record: {}", e);
            }
            self.inner.broadcast.error(id, "job cancelled").await;
        } else {
            info!(job_id = %id, "Cancellation requested, stopping at next batch boundary");
            if let Some(flag) = self.inner.cancel_flags.read().await.get(id) {
                flag.cancel();
            }
            if let Err(e) = self.inner.store.save(&record).await {
                warn!(job_id = %id, "Failed to persist cancel request: {}", e);
            }
        }
        true
    }

    /// Shutdown path: mark every non-terminal job cancelled immediately,
    /// without waiting for in-flight pipelines to observe the flag. The
    /// terminal guard in `finish` makes a pipeline's late outcome a no-op.
    pub async fn cancel_all(&self) {
        let records: Vec<Job> = {
            let mut jobs = self.inner.jobs.write().await;
            jobs.values_mut()
                .filter(|j| !j.status.is_terminal())
                .map(|job| {
                    job.cancel_requested = true;
                    job.cancel();
                    job.clone()
                })
                .collect()
        };
        if records.is_empty() {
            return;
        }

        info!("Cancelling {} jobs for shutdown", records.len());
        let flags = self.inner.cancel_flags.read().await;
        for record in &records {
            if let Some(flag) = flags.get(&record.id) {
                flag.cancel();
            }
        }
        drop(flags);

        for record in &records {
            if let Err(e) = self.inner.store.save(record).await {
                warn!(job_id = %record.id, "Failed to persist cancelled record: {}", e);
            }
            self.inner.broadcast.error(&record.id, "job cancelled").await;
        }
    }

    /// Single-writer progress update from the pipeline owning the job.
    /// A no-op once the job is terminal, so late updates never race a
    /// cancellation.
    pub async fn update_progress(&self, id: &JobId, percent: u8, message: &str) {
        self.inner.update_progress(id, percent, message).await;
    }

    /// Event fan-out, for WebSocket handlers to subscribe through.
    pub fn events(&self) -> &ProgressBroadcast {
        &self.inner.broadcast
    }

    pub fn config(&self) -> &JobsConfig {
        &self.inner.config
    }
}

impl Inner {
    /// Admission step: promote queued jobs while slots are free. Slots are
    /// reserved under the scheduler lock before the job is started, so the
    /// cap is never exceeded even with concurrent callers.
    async fn admit_next(self: Arc<Self>) {
        loop {
            let candidate = {
                let mut sched = self.sched.lock().await;
                if sched.running >= self.config.max_concurrent_jobs {
                    None
                } else {
                    match sched.queue.pop_front() {
                        Some(id) => {
                            sched.running += 1;
                            Some(id)
                        }
                        None => None,
                    }
                }
            };
            let Some(id) = candidate else { break };

            let started = {
                let mut jobs = self.jobs.write().await;
                match jobs.get_mut(&id) {
                    // Cancelled while queued: stale entry, give the slot back.
                    Some(job) if job.status == JobStatus::Queued => {
                        job.start();
                        Some(job.clone())
                    }
                    _ => None,
                }
            };

            match started {
                Some(job) => {
                    info!(job_id = %id, "Job admitted");
                    if let Err(e) = self.store.save(&job).await {
                        warn!(job_id = %id, "Failed to persist admitted record: {}", e);
                    }
                    self.broadcast.log(&id, "processing started").await;
                    self.clone().spawn_pipeline(job);
                }
                None => {
                    self.sched.lock().await.running -= 1;
                }
            }
        }
    }

    /// Launch the pipeline task for an admitted job. The run itself happens
    /// in a nested spawn so a panic surfaces as a `JoinError` and resolves to
    /// a failed job instead of a leaked slot.
    fn spawn_pipeline(self: Arc<Self>, job: Job) {
        let id = job.id.clone();
        tokio::spawn(async move {
            let cancel = CancelFlag::new();
            self.cancel_flags
                .write()
                .await
                .insert(id.clone(), cancel.clone());
            // Respect a cancel that raced in between admission and the flag
            // registration above; later cancels hit the registered flag.
            let requested = {
                let jobs = self.jobs.read().await;
                jobs.get(&id).map(|j| j.cancel_requested).unwrap_or(false)
            };
            if requested {
                cancel.cancel();
            }

            let processor = StreamingProcessor::new(
                self.codec.clone(),
                self.renderer.clone(),
                self.config.batch_size,
                self.config.work_dir.clone(),
            );
            let output_path = self
                .config
                .output_dir
                .join(format!("{}.{}", id, job.settings.format));
            let sink = ManagerSink {
                inner: self.clone(),
                job_id: id.clone(),
            };

            let handle = tokio::spawn(async move {
                if let Some(parent) = output_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                processor.run(&job, &output_path, &cancel, &sink).await
            });

            let outcome = match handle.await {
                Ok(Ok(path)) => Outcome::Completed(path),
                Ok(Err(e)) if e.is_cancelled() => Outcome::Cancelled,
                Ok(Err(e)) => Outcome::Failed(e.to_string()),
                Err(join_err) => Outcome::Failed(format!("pipeline panicked: {}", join_err)),
            };

            self.finish(&id, outcome).await;
        });
    }

    async fn update_progress(&self, id: &JobId, percent: u8, message: &str) {
        let progress = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(id) {
                Some(job) if !job.status.is_terminal() => {
                    job.set_progress(percent, message);
                    Some(job.progress)
                }
                _ => None,
            }
        };
        if let Some(progress) = progress {
            self.broadcast.progress(id, progress, message).await;
        }
    }

    /// The single exit from `Processing`: record the terminal state, publish
    /// the terminal event, release the slot, re-run admission.
    async fn finish(self: &Arc<Self>, id: &JobId, outcome: Outcome) {
        let record = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(id) {
                Some(job) if !job.status.is_terminal() => {
                    match &outcome {
                        Outcome::Completed(path) => {
                            job.complete(path.to_string_lossy().to_string())
                        }
                        Outcome::Cancelled => job.cancel(),
                        Outcome::Failed(reason) => job.fail(reason.clone()),
                    }
                    Some(job.clone())
                }
                Some(_) => None,
                None => {
                    error!(job_id = %id, "Pipeline finished for unknown job");
                    None
                }
            }
        };

        self.cancel_flags.write().await.remove(id);

        if let Some(record) = &record {
            if let Err(e) = self.store.save(record).await {
                warn!(job_id = %id, "Failed to persist terminal record: {}", e);
            }
            match record.status {
                JobStatus::Completed => {
                    let output = record.output_path.clone().unwrap_or_default();
                    info!(job_id = %id, output = %output, "Job completed");
                    self.broadcast.done(id, output).await;
                }
                JobStatus::Cancelled => {
                    info!(job_id = %id, "Job cancelled");
                    self.broadcast.error(id, "job cancelled").await;
                }
                JobStatus::Failed => {
                    let reason = record
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "render failed".to_string());
                    error!(job_id = %id, "Job failed: {}", reason);
                    self.broadcast.error(id, reason).await;
                }
                _ => {}
            }
        }

        self.sched.lock().await.running -= 1;
        self.clone().admit_next().await;
    }
}

/// Progress capability handed to the pipeline; routes batch-boundary reports
/// through the manager so the terminal no-op guard applies.
struct ManagerSink {
    inner: Arc<Inner>,
    job_id: JobId,
}

#[async_trait]
impl ProgressSink for ManagerSink {
    async fn report(&self, percent: u8, message: &str) {
        self.inner.update_progress(&self.job_id, percent, message).await;
    }
}
