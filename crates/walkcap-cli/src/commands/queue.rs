//! `walkcap queue`

use std::sync::Arc;
use walkcap_core::upload::{QueueJournal, UploadJob};
use walkcap_core::{CaptureConfig, EventBus, SharedEventBus};

use super::upload::{open_queue, report};
use crate::args::QueueAction;
use crate::console::{CliConsole, spawn_upload_progress};

pub async fn execute(config: &CaptureConfig, action: QueueAction) -> anyhow::Result<()> {
    let console = CliConsole::new();
    match action {
        // Read-only views go straight to the journal so no worker starts
        QueueAction::List => {
            let jobs = QueueJournal::new(&config.upload.journal_path).load().await?;
            console.print_header("Upload queue");
            if jobs.is_empty() {
                console.info("No upload jobs");
            }
            for job in &jobs {
                println!("  {}  {:<24} {}", job.id, job.state.to_string(), job.bundle.root.display());
            }
            Ok(())
        }
        QueueAction::Status { job_id } => {
            let jobs = QueueJournal::new(&config.upload.journal_path).load().await?;
            let job = jobs
                .into_iter()
                .find(|j| j.id == job_id)
                .ok_or_else(|| anyhow::anyhow!("no upload job {job_id}"))?;
            print_job(&console, &job);
            Ok(())
        }
        QueueAction::Retry { job_id } => {
            let events: SharedEventBus = Arc::new(EventBus::default());
            let queue = open_queue(config, events.clone()).await?;
            let progress = spawn_upload_progress(&events);
            queue.retry(&job_id).await?;
            let state = queue.wait(&job_id).await?;
            progress.abort();
            report(&console, &queue, &job_id, &state)
        }
        QueueAction::Cancel { job_id } => {
            let queue = open_queue(config, Arc::new(EventBus::default())).await?;
            queue.cancel(&job_id).await?;
            console.success(&format!("Cancelled {job_id}; uploaded objects were kept"));
            Ok(())
        }
        QueueAction::Ack { job_id } => {
            let queue = open_queue(config, Arc::new(EventBus::default())).await?;
            let job = queue.acknowledge(&job_id).await?;
            console.success(&format!("Removed {} ({})", job.id, job.state));
            Ok(())
        }
        QueueAction::Run => {
            let events: SharedEventBus = Arc::new(EventBus::default());
            let progress = spawn_upload_progress(&events);
            let queue = open_queue(config, events).await?;
            queue.wait_idle().await;
            progress.abort();
            let failed = queue
                .jobs()
                .iter()
                .filter(|j| matches!(j.state, walkcap_core::JobState::Failed { .. }))
                .count();
            if failed > 0 {
                console.warn(&format!("{failed} job(s) failed; see `walkcap queue list`"));
            } else {
                console.success("Upload queue is idle");
            }
            Ok(())
        }
    }
}

fn print_job(console: &CliConsole, job: &UploadJob) {
    console.print_header(&format!("Upload job {}", job.id));
    console.field("state", &job.state);
    console.field("session", &job.bundle.session_id);
    console.field("bundle", job.bundle.root.display());
    console.field("scene", &job.scene_id);
    console.field("remote prefix", &job.remote_prefix);
    console.field(
        "files",
        format!("{}/{}", job.completed_files.len(), job.bundle.files.len()),
    );
    console.field("total bytes", job.total_bytes);
    console.field("retries", job.attempts);
    console.field("updated", job.updated_at.to_rfc3339());
}
