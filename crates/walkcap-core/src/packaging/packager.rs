//! Session directory → sealed bundle

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

use super::archive::{ARCHIVE_FILE, write_archive};
use super::bundle::{ArtifactBundle, list_session_files};
use super::manifest::{EndReason, Manifest, ManifestOptions};
use crate::config::{RecordingConfig, SealPolicy};
use crate::error::{CaptureError, CaptureResult, ResultExt};
use crate::loggers::{MANIFEST_FILE, MESH_DIR, StreamStatus, VIDEO_FILE, VideoSummary};
use crate::types::{ExposureSample, SessionContext, StreamKind};

/// Final state of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    pub status: StreamStatus,
    pub records: u64,
}

/// Everything the recorder accumulated that the manifest needs
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedSession {
    pub streams: BTreeMap<StreamKind, StreamReport>,
    pub video: VideoSummary,
    pub exposure: Vec<ExposureSample>,
    /// Distinct mesh snapshots on disk
    pub mesh_files: u32,
    pub end_reason: EndReason,
}

impl CollectedSession {
    pub fn has_depth(&self) -> bool {
        self.streams
            .get(&StreamKind::Depth)
            .is_some_and(|r| r.status.is_enabled())
    }
}

/// Writes the manifest and seals a session directory
#[derive(Debug, Clone)]
pub struct ArtifactPackager {
    policy: SealPolicy,
    options: ManifestOptions,
}

impl ArtifactPackager {
    pub fn new(policy: SealPolicy) -> Self {
        Self {
            policy,
            options: ManifestOptions::default(),
        }
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            policy: config.seal_policy,
            options: ManifestOptions {
                nominal_fps: config.nominal_fps,
                scale_hint_m_per_unit: config.scale_hint_m_per_unit,
            },
        }
    }

    pub fn policy(&self) -> SealPolicy {
        self.policy
    }

    /// Build the manifest, write it and seal the directory
    ///
    /// Running this twice on the same directory and inputs yields byte-identical files.
    #[instrument(skip(self, context, collected), fields(session_id = %context.session_id, policy = ?self.policy))]
    pub async fn finalize(
        &self,
        session_dir: &Path,
        context: &SessionContext,
        collected: &CollectedSession,
    ) -> CaptureResult<ArtifactBundle> {
        let manifest = Manifest::build(context, collected, self.options);
        let root = session_dir.to_path_buf();
        let policy = self.policy;
        let session_id = context.session_id.clone();

        let result = tokio::task::spawn_blocking(move || seal(root, session_id, policy, manifest))
            .await
            .context("Packaging task failed")?;
        match &result {
            Ok(bundle) => info!(
                files = bundle.files.len(),
                root = %bundle.root.display(),
                "session sealed"
            ),
            Err(e) => error!(error = %e, "packaging failed"),
        }
        result
    }
}

fn seal(
    root: PathBuf,
    session_id: String,
    policy: SealPolicy,
    manifest: Manifest,
) -> CaptureResult<ArtifactBundle> {
    let video = root.join(VIDEO_FILE);
    if !video.is_file() {
        return Err(CaptureError::packaging_at("video file is missing", &video));
    }

    let manifest_path = root.join(MANIFEST_FILE);
    let tmp = root.join(format!("{}.tmp", MANIFEST_FILE));
    std::fs::write(&tmp, manifest.to_bytes()?).map_err(|e| CaptureError::io_at(&e, &tmp))?;
    std::fs::rename(&tmp, &manifest_path).map_err(|e| CaptureError::io_at(&e, &manifest_path))?;
    if !manifest_path.is_file() {
        return Err(CaptureError::packaging_at("manifest was not written", &manifest_path));
    }

    let session_files = list_session_files(&root)?;
    let (archive_path, files) = match policy {
        SealPolicy::Directory => (None, session_files),
        SealPolicy::Archive => {
            let archive = root.join(ARCHIVE_FILE);
            write_archive(&root, &session_files, &archive)?;
            (
                Some(archive),
                vec![ARCHIVE_FILE.to_string(), MANIFEST_FILE.to_string()],
            )
        }
    };

    Ok(ArtifactBundle {
        session_id,
        root,
        policy,
        archive_path,
        manifest_path,
        files,
        manifest,
    })
}

/// Number of mesh snapshots written under a session directory
pub(crate) fn count_mesh_files(session_dir: &Path) -> u32 {
    std::fs::read_dir(session_dir.join(MESH_DIR))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "obj"))
                .count() as u32
        })
        .unwrap_or(0)
}
