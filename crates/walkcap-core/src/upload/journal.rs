//! Atomic on-disk journal of every upload job

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::job::{JobState, UploadJob};
use crate::error::{CaptureError, CaptureResult};

const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct JournalFile {
    version: u32,
    jobs: Vec<UploadJob>,
}

#[derive(Debug, Clone)]
pub struct QueueJournal {
    path: PathBuf,
}

impl QueueJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all jobs; interrupted uploads come back as `Queued`
    pub async fn load(&self) -> CaptureResult<Vec<UploadJob>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CaptureError::io_at(&e, &self.path)),
        };
        let file: JournalFile = serde_json::from_slice(&bytes).map_err(|e| {
            CaptureError::json(format!(
                "Failed to parse upload journal {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut jobs = file.jobs;
        let mut resumed = 0;
        for job in &mut jobs {
            if matches!(job.state, JobState::Uploading { .. }) {
                job.set_state(JobState::Queued);
                resumed += 1;
            }
        }
        info!(jobs = jobs.len(), resumed, "upload journal loaded");
        Ok(jobs)
    }

    /// Replace the journal with `jobs` (temp file + rename)
    pub async fn save(&self, jobs: &[UploadJob]) -> CaptureResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CaptureError::io_at(&e, parent))?;
        }
        let body = serde_json::to_vec_pretty(&JournalFile {
            version: JOURNAL_VERSION,
            jobs: jobs.to_vec(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| CaptureError::io_at(&e, &tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CaptureError::io_at(&e, &self.path))?;
        debug!(jobs = jobs.len(), "upload journal saved");
        Ok(())
    }
}
