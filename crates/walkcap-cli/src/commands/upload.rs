//! `walkcap upload`

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use walkcap_core::upload::store_from_config;
use walkcap_core::{
    ArtifactBundle, CaptureConfig, EventBus, JobState, SharedEventBus, UploadMetadata, UploadQueue,
};

use crate::args::IdArgs;
use crate::console::{CliConsole, spawn_upload_progress};

/// Open the queue described by `config`, publishing on `events`
pub async fn open_queue(config: &CaptureConfig, events: SharedEventBus) -> anyhow::Result<UploadQueue> {
    let store = store_from_config(&config.upload.store)?;
    UploadQueue::open(&config.upload, store, events)
        .await
        .with_context(|| format!("opening upload queue {}", config.upload.journal_path.display()))
}

pub fn apply_ids(mut metadata: UploadMetadata, ids: &IdArgs) -> UploadMetadata {
    if let Some(target) = &ids.target {
        metadata.target_id = Some(target.clone());
    }
    if let Some(reservation) = &ids.reservation {
        metadata.reservation_id = Some(reservation.clone());
    }
    metadata
}

/// Enqueue `bundle` and, when `wait` is set, render progress until it settles
pub async fn enqueue_and_wait(
    queue: &UploadQueue,
    events: &SharedEventBus,
    bundle: ArtifactBundle,
    metadata: UploadMetadata,
    wait: bool,
) -> anyhow::Result<()> {
    let console = CliConsole::new();
    let progress = wait.then(|| spawn_upload_progress(events));
    let job_id = queue.enqueue(bundle, metadata).await?;
    console.info(&format!("Queued upload job {job_id}"));
    if !wait {
        return Ok(());
    }

    let state = queue.wait(&job_id).await?;
    if let Some(progress) = progress {
        progress.abort();
    }
    report(&console, queue, &job_id, &state)
}

pub fn report(
    console: &CliConsole,
    queue: &UploadQueue,
    job_id: &str,
    state: &JobState,
) -> anyhow::Result<()> {
    match state {
        JobState::Completed => {
            let job = queue.job(job_id)?;
            console.success(&format!("Uploaded to {}", job.remote_prefix));
            Ok(())
        }
        JobState::Failed { reason } => {
            console.error(&format!("Upload {job_id} failed: {reason}"));
            console.info(&format!("Retry with: walkcap queue retry {job_id}"));
            anyhow::bail!("upload failed")
        }
        other => {
            console.warn(&format!("Upload {job_id} ended {other}"));
            Ok(())
        }
    }
}

pub async fn execute(
    config: &CaptureConfig,
    bundle_dir: &Path,
    ids: &IdArgs,
    wait: bool,
) -> anyhow::Result<()> {
    let bundle = ArtifactBundle::open(bundle_dir)
        .with_context(|| format!("opening bundle {}", bundle_dir.display()))?;
    let metadata = apply_ids(UploadMetadata::from_bundle(&bundle)?, ids);

    let events: SharedEventBus = Arc::new(EventBus::default());
    let queue = open_queue(config, events.clone()).await?;
    enqueue_and_wait(&queue, &events, bundle, metadata, wait).await
}
