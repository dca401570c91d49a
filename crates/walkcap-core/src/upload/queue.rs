//! Concurrent, journaled upload queue

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::job::{JobState, UploadJob, UploadMetadata};
use super::journal::QueueJournal;
use super::path::{remote_prefix, resolve_scene_id};
use super::progress::ProgressTracker;
use super::store::{ObjectMetadata, ProgressFn, SharedRemoteStore, UploadBody};
use crate::config::UploadConfig;
use crate::error::{CaptureError, CaptureResult, OptionExt};
use crate::events::{CaptureEvent, SharedEventBus};
use crate::loggers::MANIFEST_FILE;
use crate::packaging::ArtifactBundle;
use crate::recovery::{RetryDecision, RetryPolicy};

struct JobEntry {
    job: UploadJob,
    cancel: CancellationToken,
    state_tx: watch::Sender<JobState>,
    /// A worker task currently owns the job
    running: bool,
}

impl JobEntry {
    fn new(job: UploadJob) -> Self {
        let (state_tx, _) = watch::channel(job.state.clone());
        Self {
            job,
            cancel: CancellationToken::new(),
            state_tx,
            running: false,
        }
    }

    fn set_state(&mut self, state: JobState) {
        self.job.set_state(state.clone());
        self.state_tx.send_replace(state);
    }

    /// Change state without waking waiters; see [`QueueInner::announce`]
    fn record_state(&mut self, state: JobState) {
        self.job.set_state(state);
    }
}

struct QueueInner {
    store: SharedRemoteStore,
    retry: RetryPolicy,
    max_concurrent_files: usize,
    events: SharedEventBus,
    jobs: Mutex<BTreeMap<String, JobEntry>>,
    journal: QueueJournal,
    /// Serializes journal writes so a stale snapshot never overwrites a newer one
    journal_lock: tokio::sync::Mutex<()>,
    /// Bounds concurrently uploading jobs
    permits: Arc<Semaphore>,
}

/// Uploads sealed bundles to a [`RemoteStore`](super::RemoteStore)
///
/// Cloning is cheap; all clones share the same jobs and workers.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("journal", &self.inner.journal.path())
            .field("jobs", &self.inner.jobs.lock().len())
            .finish()
    }
}

impl UploadQueue {
    /// Open the queue at `config.journal_path` and resume every `Queued` job
    #[instrument(skip_all, fields(journal = %config.journal_path.display()))]
    pub async fn open(
        config: &UploadConfig,
        store: SharedRemoteStore,
        events: SharedEventBus,
    ) -> CaptureResult<Self> {
        config.validate()?;
        let journal = QueueJournal::new(&config.journal_path);
        let jobs = journal.load().await?;

        let inner = Arc::new(QueueInner {
            store,
            retry: RetryPolicy::new(config.retry.clone()),
            max_concurrent_files: config.max_concurrent_files,
            events,
            jobs: Mutex::new(BTreeMap::new()),
            journal,
            journal_lock: tokio::sync::Mutex::new(()),
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
        });

        let resumable: Vec<String> = {
            let mut map = inner.jobs.lock();
            for job in jobs {
                map.insert(job.id.clone(), JobEntry::new(job));
            }
            map.values()
                .filter(|e| e.job.state == JobState::Queued)
                .map(|e| e.job.id.clone())
                .collect()
        };
        inner.persist().await?;

        for id in resumable {
            info!(job_id = %id, "resuming upload");
            inner.spawn_worker(&id);
        }
        Ok(Self { inner })
    }

    /// Accept a sealed bundle; returns the new job id
    ///
    /// The remote prefix and total byte count are fixed here and never recomputed.
    #[instrument(skip_all, fields(session_id = %bundle.session_id))]
    pub async fn enqueue(
        &self,
        bundle: ArtifactBundle,
        metadata: UploadMetadata,
    ) -> CaptureResult<String> {
        let id = Uuid::new_v4().to_string();
        let scene_id = resolve_scene_id(&metadata, &id);
        let now = Utc::now();
        let mut job = UploadJob {
            id: id.clone(),
            remote_prefix: remote_prefix(&scene_id, metadata.capture_source, now, Uuid::new_v4()),
            scene_id,
            bundle,
            metadata,
            state: JobState::Queued,
            total_bytes: 0,
            completed_files: Default::default(),
            attempts: 0,
            created_at: now,
            updated_at: now,
        };

        let mut total = self.inner.patched_manifest(&job)?.len() as u64;
        for rel in job.bundle.payload_files() {
            let path = job.bundle.root.join(rel);
            let meta = tokio::fs::metadata(&path).await.map_err(|e| {
                CaptureError::packaging_at(format!("bundle file missing: {}", e), &path)
            })?;
            total += meta.len();
        }
        job.total_bytes = total;

        info!(job_id = %id, prefix = %job.remote_prefix, total_bytes = total, "upload queued");
        self.inner
            .jobs
            .lock()
            .insert(id.clone(), JobEntry::new(job));
        self.inner.persist().await?;
        self.inner.events.publish(CaptureEvent::UploadQueued {
            job_id: id.clone(),
        });
        self.inner.spawn_worker(&id);
        Ok(id)
    }

    pub fn status(&self, job_id: &str) -> CaptureResult<JobState> {
        Ok(self.job(job_id)?.state)
    }

    pub fn job(&self, job_id: &str) -> CaptureResult<UploadJob> {
        self.inner
            .jobs
            .lock()
            .get(job_id)
            .map(|e| e.job.clone())
            .context(format!("upload job {}", job_id))
    }

    /// Every job, ordered by id
    pub fn jobs(&self) -> Vec<UploadJob> {
        self.inner
            .jobs
            .lock()
            .values()
            .map(|e| e.job.clone())
            .collect()
    }

    /// Requeue a `Failed` job with a fresh retry budget
    pub async fn retry(&self, job_id: &str) -> CaptureResult<()> {
        {
            let mut map = self.inner.jobs.lock();
            let entry = map
                .get_mut(job_id)
                .context(format!("upload job {}", job_id))?;
            if !matches!(entry.job.state, JobState::Failed { .. }) {
                return Err(CaptureError::invalid_transition(&entry.job.state, "retry"));
            }
            entry.job.attempts = 0;
            entry.cancel = CancellationToken::new();
            entry.set_state(JobState::Queued);
        }
        info!(job_id, "upload retry requested");
        self.inner.persist().await?;
        self.inner.events.publish(CaptureEvent::UploadQueued {
            job_id: job_id.to_string(),
        });
        self.inner.spawn_worker(job_id);
        Ok(())
    }

    /// Stop a job and remove it from retry consideration
    ///
    /// Objects already accepted by the remote store are left in place.
    pub async fn cancel(&self, job_id: &str) -> CaptureResult<()> {
        {
            let mut map = self.inner.jobs.lock();
            let entry = map
                .get_mut(job_id)
                .context(format!("upload job {}", job_id))?;
            match entry.job.state {
                JobState::Cancelled => return Ok(()),
                JobState::Completed => {
                    return Err(CaptureError::invalid_transition(&entry.job.state, "cancel"));
                }
                _ => {}
            }
            entry.cancel.cancel();
            entry.record_state(JobState::Cancelled);
        }
        info!(job_id, "upload cancelled");
        let saved = self.inner.persist().await;
        self.inner.announce(job_id);
        saved?;
        self.inner.events.publish(CaptureEvent::UploadCancelled {
            job_id: job_id.to_string(),
        });
        Ok(())
    }

    /// Forget a `Completed` or `Cancelled` job
    pub async fn acknowledge(&self, job_id: &str) -> CaptureResult<UploadJob> {
        let job = {
            let mut map = self.inner.jobs.lock();
            let state = map
                .get(job_id)
                .map(|e| e.job.state.clone())
                .context(format!("upload job {}", job_id))?;
            if !matches!(state, JobState::Completed | JobState::Cancelled) {
                return Err(CaptureError::invalid_transition(state, "acknowledge"));
            }
            map.remove(job_id).map(|e| e.job)
        };
        self.inner.persist().await?;
        job.context(format!("upload job {}", job_id))
    }

    /// Resolve once the job is `Completed`, `Failed` or `Cancelled`
    pub async fn wait(&self, job_id: &str) -> CaptureResult<JobState> {
        let mut rx = self
            .inner
            .jobs
            .lock()
            .get(job_id)
            .map(|e| e.state_tx.subscribe())
            .context(format!("upload job {}", job_id))?;
        let settled = rx
            .wait_for(JobState::is_settled)
            .await
            .map(|state| state.clone());
        Ok(match settled {
            Ok(state) => state,
            // Sender dropped: the job was acknowledged after settling
            Err(_) => rx.borrow().clone(),
        })
    }

    /// Resolve once no job is queued or uploading
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<String> = self
                .inner
                .jobs
                .lock()
                .values()
                .filter(|e| !e.job.state.is_settled())
                .map(|e| e.job.id.clone())
                .collect();
            if pending.is_empty() {
                return;
            }
            for id in pending {
                let _ = self.wait(&id).await;
            }
        }
    }
}

enum Outcome {
    Done,
    Cancelled,
    Failed(CaptureError),
}

impl QueueInner {
    fn spawn_worker(self: &Arc<Self>, job_id: &str) {
        {
            let mut map = self.jobs.lock();
            match map.get_mut(job_id) {
                Some(entry) if !entry.running => entry.running = true,
                _ => return,
            }
        }
        let inner = Arc::clone(self);
        let id = job_id.to_string();
        tokio::spawn(async move { inner.run_job(id).await });
    }

    async fn run_job(self: Arc<Self>, id: String) {
        let Some((job, cancel)) = self.snapshot(&id) else {
            return;
        };
        let tracker = Arc::new(ProgressTracker::new(job.total_bytes));
        for rel in &job.completed_files {
            // The uploaded manifest is the patched copy, not the file on disk
            let sent = if rel == MANIFEST_FILE {
                self.patched_manifest(&job).map(|m| m.len() as u64).ok()
            } else {
                tokio::fs::metadata(job.bundle.root.join(rel)).await.ok().map(|m| m.len())
            };
            if let Some(sent) = sent {
                tracker.update(rel, sent);
            }
        }

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(job) = self.begin_attempt(&id, tracker.fraction()) else {
                break;
            };
            self.save_or_warn().await;
            debug!(job_id = %id, attempt = job.attempts, "upload attempt started");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Outcome::Cancelled,
                result = self.attempt(&job, &tracker) => match result {
                    Ok(()) => Outcome::Done,
                    Err(e) => Outcome::Failed(e),
                },
            };
            drop(permit);

            match outcome {
                Outcome::Cancelled => break,
                Outcome::Done => {
                    if tracker.fraction() < 1.0 {
                        self.events.publish(CaptureEvent::UploadProgress {
                            job_id: id.clone(),
                            progress: 1.0,
                        });
                    }
                    if !self.settle(&id, JobState::Completed) {
                        return;
                    }
                    self.save_or_warn().await;
                    self.announce(&id);
                    info!(job_id = %id, "upload completed");
                    self.events
                        .publish(CaptureEvent::UploadCompleted { job_id: id.clone() });
                    return;
                }
                Outcome::Failed(error) => {
                    let Some(delay) = self.handle_failure(&id, &job, &error).await else {
                        return;
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        self.release(&id);
    }

    /// Requeue with a backoff delay, or settle as `Failed`
    async fn handle_failure(
        &self,
        id: &str,
        job: &UploadJob,
        error: &CaptureError,
    ) -> Option<std::time::Duration> {
        match self.retry.decide(error, job.attempts) {
            RetryDecision::RetryAfter(delay) => {
                let attempt = {
                    let mut map = self.jobs.lock();
                    let entry = map.get_mut(id)?;
                    if entry.job.state == JobState::Cancelled {
                        entry.running = false;
                        return None;
                    }
                    entry.job.attempts += 1;
                    entry.set_state(JobState::Queued);
                    entry.job.attempts
                };
                self.save_or_warn().await;
                warn!(job_id = %id, attempt, ?delay, error = %error, "upload failed, retrying");
                self.events.publish(CaptureEvent::UploadRetrying {
                    job_id: id.to_string(),
                    attempt,
                    delay,
                    reason: error.to_string(),
                });
                Some(delay)
            }
            RetryDecision::GiveUp => {
                let reason = error.to_string();
                if !self.settle(
                    id,
                    JobState::Failed {
                        reason: reason.clone(),
                    },
                ) {
                    return None;
                }
                self.save_or_warn().await;
                self.announce(id);
                warn!(job_id = %id, error = %error, "upload failed");
                self.events.publish(CaptureEvent::UploadFailed {
                    job_id: id.to_string(),
                    reason,
                });
                None
            }
        }
    }

    /// Upload every pending payload file, then the patched manifest
    async fn attempt(self: &Arc<Self>, job: &UploadJob, tracker: &Arc<ProgressTracker>) -> CaptureResult<()> {
        let metadata = ObjectMetadata::new(&job.id, &job.metadata, &job.scene_id);
        let uploads: Vec<_> = job
            .bundle
            .payload_files()
            .filter(|rel| !job.completed_files.contains(*rel))
            .map(|rel| {
                Arc::clone(self).upload_file(
                    job.id.clone(),
                    job.key_for(rel),
                    UploadBody::File(job.bundle.root.join(rel)),
                    metadata.clone(),
                    rel.to_string(),
                    Arc::clone(tracker),
                )
            })
            .collect();

        stream::iter(uploads)
            .buffer_unordered(self.max_concurrent_files)
            .try_collect::<Vec<()>>()
            .await?;

        if !job.completed_files.contains(MANIFEST_FILE) {
            let manifest = self.patched_manifest(job)?;
            Arc::clone(self)
                .upload_file(
                    job.id.clone(),
                    job.key_for(MANIFEST_FILE),
                    UploadBody::Bytes(manifest),
                    metadata,
                    MANIFEST_FILE.to_string(),
                    Arc::clone(tracker),
                )
                .await?;
        }
        Ok(())
    }

    async fn upload_file(
        self: Arc<Self>,
        job_id: String,
        key: String,
        body: UploadBody,
        metadata: ObjectMetadata,
        rel: String,
        tracker: Arc<ProgressTracker>,
    ) -> CaptureResult<()> {
        let progress = self.progress_fn(&job_id, &rel, &tracker);
        self.store.put(&key, body, &metadata, progress).await?;
        self.file_done(&job_id, &rel).await
    }

    /// Manifest copy with `scene_id` and `video_uri` filled in
    fn patched_manifest(&self, job: &UploadJob) -> CaptureResult<Vec<u8>> {
        let video_uri = self
            .store
            .uri_for(&job.key_for(job.bundle.primary_artifact()));
        job.bundle
            .manifest
            .patched(&job.scene_id, &video_uri)
            .to_bytes()
    }

    fn progress_fn(self: &Arc<Self>, id: &str, rel: &str, tracker: &Arc<ProgressTracker>) -> ProgressFn {
        let inner = Arc::clone(self);
        let tracker = Arc::clone(tracker);
        let id = id.to_string();
        let rel = rel.to_string();
        Arc::new(move |bytes| {
            if let Some(progress) = tracker.update(&rel, bytes) {
                inner.report_progress(&id, progress);
            }
        })
    }

    fn report_progress(&self, id: &str, progress: f64) {
        {
            let mut map = self.jobs.lock();
            let Some(entry) = map.get_mut(id) else {
                return;
            };
            if !matches!(entry.job.state, JobState::Uploading { .. }) {
                return;
            }
            entry.set_state(JobState::Uploading { progress });
        }
        self.events.publish(CaptureEvent::UploadProgress {
            job_id: id.to_string(),
            progress,
        });
    }

    async fn file_done(&self, id: &str, rel: &str) -> CaptureResult<()> {
        if let Some(entry) = self.jobs.lock().get_mut(id) {
            entry.job.completed_files.insert(rel.to_string());
            entry.job.updated_at = Utc::now();
        }
        debug!(job_id = %id, file = rel, "file accepted");
        self.persist().await
    }

    fn snapshot(&self, id: &str) -> Option<(UploadJob, CancellationToken)> {
        self.jobs
            .lock()
            .get(id)
            .map(|e| (e.job.clone(), e.cancel.clone()))
    }

    /// Move a `Queued` job to `Uploading`; `None` if it was cancelled meanwhile
    fn begin_attempt(&self, id: &str, progress: f64) -> Option<UploadJob> {
        let mut map = self.jobs.lock();
        let entry = map.get_mut(id)?;
        if entry.job.state != JobState::Queued {
            return None;
        }
        entry.set_state(JobState::Uploading { progress });
        Some(entry.job.clone())
    }

    /// Record a terminal state and release the worker; false if the job was cancelled
    ///
    /// Waiters are woken by [`Self::announce`] once the journal holds the new state.
    fn settle(&self, id: &str, state: JobState) -> bool {
        let mut map = self.jobs.lock();
        let Some(entry) = map.get_mut(id) else {
            return false;
        };
        entry.running = false;
        if entry.job.state == JobState::Cancelled {
            return false;
        }
        entry.record_state(state);
        true
    }

    fn announce(&self, id: &str) {
        if let Some(entry) = self.jobs.lock().get(id) {
            entry.state_tx.send_replace(entry.job.state.clone());
        }
    }

    fn release(&self, id: &str) {
        if let Some(entry) = self.jobs.lock().get_mut(id) {
            entry.running = false;
        }
    }

    async fn persist(&self) -> CaptureResult<()> {
        let _guard = self.journal_lock.lock().await;
        let jobs: Vec<UploadJob> = self.jobs.lock().values().map(|e| e.job.clone()).collect();
        self.journal.save(&jobs).await
    }

    async fn save_or_warn(&self) {
        if let Err(e) = self.persist().await {
            warn!(error = %e, "failed to write upload journal");
        }
    }
}
