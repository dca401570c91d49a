//! Sealing sessions interrupted before they were finalized

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::lease::SessionLease;
use crate::error::{CaptureError, CaptureResult};
use crate::loggers::{
    CONFIDENCE_DIR, DEPTH_DIR, EXPOSURE_FILE, MESH_DIR, MOTION_FILE, POSES_FILE, StreamStatus,
    VIDEO_INDEX_FILE, VideoFrameRecord, VideoSummary, read_jsonl,
};
use crate::packaging::{
    ArtifactBundle, ArtifactPackager, CollectedSession, EndReason, SESSION_FILE,
    StreamReport, count_mesh_files,
};
use crate::types::{ExposureSample, SessionContext, StreamKind};

/// Seal every session under `sessions_root` that still holds its lease
///
/// A lease file whose lock nobody holds means the recorder never reached seal (crash, power
/// loss). Each such session is rebuilt from its logs and sealed with `end_reason = recovered`.
/// Sessions a live recorder still locks are left alone. Sessions that cannot be recovered are
/// logged and skipped.
#[instrument(skip(packager), fields(root = %sessions_root.display()))]
pub async fn recover_interrupted(
    sessions_root: &Path,
    packager: &ArtifactPackager,
) -> CaptureResult<Vec<ArtifactBundle>> {
    let mut entries = match tokio::fs::read_dir(sessions_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CaptureError::io_at(&e, sessions_root)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CaptureError::io_at(&e, sessions_root))?
    {
        let path = entry.path();
        if path.is_dir() && SessionLease::is_held(&path) {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut bundles = Vec::new();
    for dir in dirs {
        let lease = match SessionLease::reclaim(&dir) {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                debug!(dir = %dir.display(), "session is still recording");
                continue;
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "could not inspect session lease");
                continue;
            }
        };
        match recover_session(&dir, lease, packager).await {
            Ok(bundle) => {
                info!(session_id = %bundle.session_id, "recovered interrupted session");
                bundles.push(bundle);
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "could not recover session"),
        }
    }
    Ok(bundles)
}

async fn recover_session(
    dir: &Path,
    lease: SessionLease,
    packager: &ArtifactPackager,
) -> CaptureResult<ArtifactBundle> {
    let session_path = dir.join(SESSION_FILE);
    let bytes = tokio::fs::read(&session_path)
        .await
        .map_err(|e| CaptureError::packaging_at(format!("no session record: {}", e), &session_path))?;
    let context: SessionContext = serde_json::from_slice(&bytes)?;

    let video_records: Vec<VideoFrameRecord> = read_optional(&dir.join(VIDEO_INDEX_FILE)).await?;
    let exposure: Vec<ExposureSample> = read_optional(&dir.join(EXPOSURE_FILE)).await?;
    let video = VideoSummary::from_records(&video_records);

    let mut streams = BTreeMap::new();
    let counts = [
        (StreamKind::Video, Some(video_records.len() as u64)),
        (StreamKind::Motion, count_lines(&dir.join(MOTION_FILE)).await),
        (StreamKind::Pose, count_lines(&dir.join(POSES_FILE)).await),
        (StreamKind::Depth, count_files(&dir.join(DEPTH_DIR)).await),
        (StreamKind::Confidence, count_files(&dir.join(CONFIDENCE_DIR)).await),
        (StreamKind::Mesh, count_files(&dir.join(MESH_DIR)).await),
        (StreamKind::Exposure, dir.join(EXPOSURE_FILE).is_file().then_some(exposure.len() as u64)),
    ];
    for (stream, records) in counts {
        let report = match records {
            Some(records) => StreamReport {
                status: StreamStatus::Enabled,
                records,
            },
            None => StreamReport {
                status: StreamStatus::Disabled {
                    reason: "not recorded".to_string(),
                },
                records: 0,
            },
        };
        streams.insert(stream, report);
    }

    let collected = CollectedSession {
        streams,
        video,
        exposure,
        mesh_files: count_mesh_files(dir),
        end_reason: EndReason::Recovered,
    };
    let bundle = packager.finalize(dir, &context, &collected).await?;
    lease.release()?;
    Ok(bundle)
}

async fn read_optional<T: serde::de::DeserializeOwned>(path: &Path) -> CaptureResult<Vec<T>> {
    if path.is_file() {
        read_jsonl(path).await
    } else {
        Ok(Vec::new())
    }
}

async fn count_lines(path: &Path) -> Option<u64> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    Some(content.lines().filter(|l| !l.trim().is_empty()).count() as u64)
}

async fn count_files(dir: &Path) -> Option<u64> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut count = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().extension().is_some_and(|e| e == "png" || e == "obj") {
            count += 1;
        }
    }
    Some(count)
}
