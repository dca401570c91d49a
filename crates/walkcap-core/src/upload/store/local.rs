//! Store that mirrors objects into a local directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::{ObjectMetadata, ProgressFn, RemoteStore, UploadBody};
use crate::error::{CaptureError, CaptureResult};

const CHUNK_SIZE: usize = 256 * 1024;

/// Writes each key to `{root}/{key}` with a `{key}.meta.json` sidecar
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> CaptureResult<PathBuf> {
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(CaptureError::upload_permanent(format!(
                "invalid object key: {}",
                key
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl RemoteStore for LocalDirStore {
    async fn put(
        &self,
        key: &str,
        body: UploadBody,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> CaptureResult<()> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CaptureError::io_at(&e, parent))?;
        }
        let partial = partial_path(&dest, "partial");
        let mut out = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| CaptureError::io_at(&e, &partial))?;

        let mut sent = 0u64;
        match body {
            UploadBody::Bytes(bytes) => {
                for chunk in bytes.chunks(CHUNK_SIZE) {
                    out.write_all(chunk)
                        .await
                        .map_err(|e| CaptureError::io_at(&e, &partial))?;
                    sent += chunk.len() as u64;
                    progress(sent);
                }
            }
            UploadBody::File(src) => {
                let mut input = tokio::fs::File::open(&src)
                    .await
                    .map_err(|e| CaptureError::io_at(&e, &src))?;
                let mut buf = vec![0u8; CHUNK_SIZE];
                loop {
                    let n = input
                        .read(&mut buf)
                        .await
                        .map_err(|e| CaptureError::io_at(&e, &src))?;
                    if n == 0 {
                        break;
                    }
                    out.write_all(&buf[..n])
                        .await
                        .map_err(|e| CaptureError::io_at(&e, &partial))?;
                    sent += n as u64;
                    progress(sent);
                }
            }
        }
        out.flush()
            .await
            .map_err(|e| CaptureError::io_at(&e, &partial))?;
        drop(out);

        let sidecar = partial_path(&dest, "meta.json");
        tokio::fs::write(&sidecar, serde_json::to_vec_pretty(metadata)?)
            .await
            .map_err(|e| CaptureError::io_at(&e, &sidecar))?;
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| CaptureError::io_at(&e, &dest))?;

        debug!(key, bytes = sent, "object stored");
        Ok(())
    }

    fn uri_for(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}

fn partial_path(dest: &Path, suffix: &str) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn metadata() -> ObjectMetadata {
        ObjectMetadata {
            job_id: "job".into(),
            creator_id: "creator".into(),
            capture_source: "iphone".into(),
            captured_at: "2026-01-01T00:00:00+00:00".into(),
            scene_id: "scene".into(),
            target_id: None,
            reservation_id: None,
        }
    }

    #[tokio::test]
    async fn test_put_file_with_sidecar_and_progress() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("video.h264");
        std::fs::write(&src, vec![7u8; CHUNK_SIZE + 10]).unwrap();

        let store = LocalDirStore::new(dir.path().join("remote"));
        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = seen.clone();
        store
            .put(
                "scenes/s/iphone/raw/video.h264",
                UploadBody::File(src),
                &metadata(),
                Arc::new(move |n| seen_cb.store(n, Ordering::SeqCst)),
            )
            .await
            .unwrap();

        let dest = store.root().join("scenes/s/iphone/raw/video.h264");
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), (CHUNK_SIZE + 10) as u64);
        assert_eq!(seen.load(Ordering::SeqCst), (CHUNK_SIZE + 10) as u64);
        let sidecar = std::fs::read_to_string(store.root().join("scenes/s/iphone/raw/video.h264.meta.json")).unwrap();
        assert!(sidecar.contains("\"creatorId\": \"creator\""));
        assert!(store.uri_for("a/b").starts_with("file://"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent_and_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(dir.path());
        let noop: ProgressFn = Arc::new(|_| {});
        for body in [b"first".to_vec(), b"second".to_vec()] {
            store
                .put("k/manifest.json", UploadBody::Bytes(body), &metadata(), noop.clone())
                .await
                .unwrap();
        }
        assert_eq!(std::fs::read(dir.path().join("k/manifest.json")).unwrap(), b"second");

        let err = store
            .put("../escape", UploadBody::Bytes(vec![]), &metadata(), noop)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::UploadPermanent { .. }));
    }
}
