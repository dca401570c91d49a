//! Sealed session bundle

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::archive::ARCHIVE_FILE;
use super::manifest::Manifest;
use crate::config::SealPolicy;
use crate::error::{CaptureError, CaptureResult};
use crate::loggers::{MANIFEST_FILE, VIDEO_FILE};

/// Files under a session directory that never ship
pub(crate) const LEASE_FILE: &str = ".recording.lock";
pub(crate) const SESSION_FILE: &str = "session.json";

/// An immutable, sealed session ready for upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub session_id: String,
    /// Session directory
    pub root: PathBuf,
    pub policy: SealPolicy,
    pub archive_path: Option<PathBuf>,
    pub manifest_path: PathBuf,
    /// Upload set relative to `root`, sorted, manifest included
    pub files: Vec<String>,
    pub manifest: Manifest,
}

impl ArtifactBundle {
    /// Relative path of the file `video_uri` points at
    pub fn primary_artifact(&self) -> &str {
        match self.policy {
            SealPolicy::Archive => ARCHIVE_FILE,
            SealPolicy::Directory => VIDEO_FILE,
        }
    }

    /// Every file except the manifest, which is uploaded last
    pub fn payload_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|f| *f != MANIFEST_FILE)
    }

    /// Reopen a sealed bundle from its session directory
    pub fn open(root: &Path) -> CaptureResult<Self> {
        let manifest_path = root.join(MANIFEST_FILE);
        let bytes = std::fs::read(&manifest_path).map_err(|e| {
            CaptureError::packaging_at(format!("bundle is not sealed: {}", e), &manifest_path)
        })?;
        let manifest = Manifest::from_bytes(&bytes)?;

        let archive = root.join(ARCHIVE_FILE);
        let (policy, archive_path, files) = if archive.is_file() {
            (
                SealPolicy::Archive,
                Some(archive),
                vec![ARCHIVE_FILE.to_string(), MANIFEST_FILE.to_string()],
            )
        } else {
            (SealPolicy::Directory, None, list_session_files(root)?)
        };

        Ok(Self {
            session_id: manifest.session_id.clone(),
            root: root.to_path_buf(),
            policy,
            archive_path,
            manifest_path,
            files,
            manifest,
        })
    }
}

fn is_shipped(rel: &str) -> bool {
    rel != LEASE_FILE
        && rel != SESSION_FILE
        && rel != ARCHIVE_FILE
        && !rel.ends_with(".tmp")
}

/// Relative `/`-separated paths of every shipped file under `root`, sorted
pub(crate) fn list_session_files(root: &Path) -> CaptureResult<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| CaptureError::io_at(&e, &dir))?;
        for entry in entries {
            let entry = entry.map_err(|e| CaptureError::io_at(&e, &dir))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| CaptureError::io_at(&e, &path))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let Ok(rel) = path.strip_prefix(root) else {
                    continue;
                };
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if is_shipped(&rel) {
                    files.push(rel);
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_excludes_working_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("depth")).unwrap();
        for f in [
            "video.h264",
            "manifest.json",
            "depth/000001.png",
            "depth/000000.png",
            ".recording.lock",
            "session.json",
            "intrinsics.json.tmp",
        ] {
            std::fs::write(root.join(f), b"x").unwrap();
        }

        let files = list_session_files(root).unwrap();
        assert_eq!(
            files,
            vec![
                "depth/000000.png",
                "depth/000001.png",
                "manifest.json",
                "video.h264"
            ]
        );
    }

    #[test]
    fn test_open_unsealed_is_packaging_error() {
        let dir = TempDir::new().unwrap();
        let err = ArtifactBundle::open(dir.path()).unwrap_err();
        assert!(matches!(err, CaptureError::Packaging { .. }));
    }
}
