//! Remote object layout

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::UploadMetadata;
use crate::types::CaptureSource;

/// First non-empty of target id, reservation id, job id
pub fn resolve_scene_id(metadata: &UploadMetadata, job_id: &str) -> String {
    [metadata.target_id.as_deref(), metadata.reservation_id.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(job_id)
        .to_string()
}

/// `scenes/{sceneId}/{source}/{timestamp}-{uuid}/raw`, with a filesystem-safe UTC timestamp
pub fn remote_prefix(
    scene_id: &str,
    source: CaptureSource,
    at: DateTime<Utc>,
    nonce: Uuid,
) -> String {
    format!(
        "scenes/{}/{}/{}-{}/raw",
        scene_id,
        source.as_str(),
        at.format("%Y-%m-%dT%H-%M-%SZ"),
        nonce
    )
}

pub fn object_key(prefix: &str, relative_path: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), relative_path)
}
