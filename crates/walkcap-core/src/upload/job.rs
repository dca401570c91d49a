//! Upload job model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::path::object_key;
use crate::error::{CaptureError, CaptureResult};
use crate::packaging::{ArtifactBundle, SESSION_FILE};
use crate::types::{CaptureSource, SessionContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Uploading { progress: f64 },
    Completed,
    Failed { reason: String },
    Cancelled,
}

impl JobState {
    /// No worker will touch the job again without an explicit `retry`
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading { .. } => "uploading",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploading { progress } => write!(f, "uploading ({:.0}%)", progress * 100.0),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Who and what a bundle belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub creator_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub reservation_id: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub capture_source: CaptureSource,
}

impl UploadMetadata {
    pub fn from_context(context: &SessionContext) -> Self {
        Self {
            creator_id: context.creator_id.clone(),
            target_id: context.target_id.clone(),
            reservation_id: context.reservation_id.clone(),
            captured_at: context.started_at,
            capture_source: context.capture_source,
        }
    }

    /// Read the session record kept beside a sealed bundle
    pub fn from_bundle(bundle: &ArtifactBundle) -> CaptureResult<Self> {
        let path = bundle.root.join(SESSION_FILE);
        let bytes = std::fs::read(&path).map_err(|e| CaptureError::io_at(&e, &path))?;
        let context: SessionContext = serde_json::from_slice(&bytes)?;
        Ok(Self::from_context(&context))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: String,
    pub bundle: ArtifactBundle,
    pub metadata: UploadMetadata,
    pub state: JobState,
    pub scene_id: String,
    /// `scenes/{sceneId}/{source}/{timestamp}-{uuid}/raw`
    pub remote_prefix: String,
    /// Payload files plus the patched manifest
    pub total_bytes: u64,
    /// Files the remote store has accepted
    #[serde(default)]
    pub completed_files: BTreeSet<String>,
    /// Automatic retries spent since enqueue or the last manual retry
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn key_for(&self, relative_path: &str) -> String {
        object_key(&self.remote_prefix, relative_path)
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(JobState::Uploading { progress: 0.5 }).unwrap();
        assert_eq!(json["state"], "uploading");
        assert_eq!(json["progress"], 0.5);
        let back: JobState = serde_json::from_value(json).unwrap();
        assert_eq!(back, JobState::Uploading { progress: 0.5 });
    }

    #[test]
    fn test_metadata_from_context() {
        let context = SessionContext::new(
            "s",
            "creator",
            crate::types::DeviceDescriptor::new("iPhone", "17"),
        )
        .with_reservation("r-1")
        .with_source(CaptureSource::Glasses);
        let metadata = UploadMetadata::from_context(&context);
        assert_eq!(metadata.creator_id, "creator");
        assert_eq!(metadata.reservation_id.as_deref(), Some("r-1"));
        assert_eq!(metadata.target_id, None);
        assert_eq!(metadata.capture_source, CaptureSource::Glasses);
        assert_eq!(metadata.captured_at, context.started_at);
    }

    #[test]
    fn test_settled_states() {
        assert!(!JobState::Queued.is_settled());
        assert!(!JobState::Uploading { progress: 0.1 }.is_settled());
        assert!(JobState::Completed.is_settled());
        assert!(JobState::Cancelled.is_settled());
        assert!(
            JobState::Failed {
                reason: "quota".into()
            }
            .is_settled()
        );
        assert_eq!(JobState::Uploading { progress: 0.25 }.to_string(), "uploading (25%)");
    }
}
