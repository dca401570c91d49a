//! Remote object stores

mod http;
mod local;

pub use http::HttpStore;
pub use local::LocalDirStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::CaptureResult;
use crate::upload::job::UploadMetadata;

/// Called with the bytes sent so far for one object
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

pub type SharedRemoteStore = Arc<dyn RemoteStore>;

/// Metadata attached to every uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub job_id: String,
    pub creator_id: String,
    pub capture_source: String,
    pub captured_at: String,
    pub scene_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
}

impl ObjectMetadata {
    pub fn new(job_id: &str, metadata: &UploadMetadata, scene_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            creator_id: metadata.creator_id.clone(),
            capture_source: metadata.capture_source.as_str().to_string(),
            captured_at: metadata.captured_at.to_rfc3339(),
            scene_id: scene_id.to_string(),
            target_id: metadata.target_id.clone(),
            reservation_id: metadata.reservation_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UploadBody {
    /// Streamed from disk
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl UploadBody {
    pub async fn len(&self) -> CaptureResult<u64> {
        match self {
            Self::File(path) => Ok(tokio::fs::metadata(path)
                .await
                .map_err(|e| crate::error::CaptureError::io_at(&e, path))?
                .len()),
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }
}

/// Destination for bundle objects
///
/// `put` must be idempotent per key: a retried job rewrites the same keys.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        body: UploadBody,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> CaptureResult<()>;

    /// Public URI of `key`, written into the manifest as `video_uri`
    fn uri_for(&self, key: &str) -> String;
}

pub fn store_from_config(config: &StoreConfig) -> CaptureResult<SharedRemoteStore> {
    Ok(match config {
        StoreConfig::Local { root } => Arc::new(LocalDirStore::new(root.clone())),
        StoreConfig::Http {
            base_url,
            bearer_token,
            timeout,
        } => Arc::new(HttpStore::new(base_url, bearer_token.clone(), *timeout)?),
    })
}
