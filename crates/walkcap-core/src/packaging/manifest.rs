//! Bundle manifest
//!
//! Field order is fixed by the struct and no wall-clock values are written, so the same
//! session always renders to the same bytes. `scene_id` and `video_uri` stay empty on disk;
//! the uploader fills them on a copy via [`Manifest::patched`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::packager::CollectedSession;
use crate::error::CaptureResult;
use crate::loggers::StreamStatus;
use crate::types::{CaptureSource, ExposureSample, SessionContext, StreamKind};

/// How the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserStop,
    Abnormal,
    Recovered,
}

/// Per-stream line of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    #[serde(flatten)]
    pub status: StreamStatus,
    pub records: u64,
}

/// Values taken from recording configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifestOptions {
    pub nominal_fps: f64,
    pub scale_hint_m_per_unit: f64,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            nominal_fps: 30.0,
            scale_hint_m_per_unit: 1.0,
        }
    }
}

fn default_scale_hint() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub scene_id: String,
    pub video_uri: String,
    pub device_model: String,
    pub os_version: String,
    pub fps_source: f64,
    pub width: u32,
    pub height: u32,
    pub capture_start_epoch_ms: i64,
    pub has_lidar: bool,
    #[serde(default = "default_scale_hint")]
    pub scale_hint_m_per_unit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_space_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_point_cloud_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_point_cloud_count: Option<u32>,
    #[serde(default)]
    pub exposure_samples: Vec<ExposureSample>,
    pub session_id: String,
    pub capture_source: CaptureSource,
    pub duration_s: f64,
    pub video_frame_count: u64,
    pub streams: BTreeMap<StreamKind, StreamEntry>,
    pub end_reason: EndReason,
}

impl Manifest {
    pub fn build(
        context: &SessionContext,
        collected: &CollectedSession,
        options: ManifestOptions,
    ) -> Self {
        let video = &collected.video;
        let streams = collected
            .streams
            .iter()
            .map(|(kind, report)| {
                (
                    *kind,
                    StreamEntry {
                        status: report.status.clone(),
                        records: report.records,
                    },
                )
            })
            .collect();

        let mesh_count = collected.mesh_files;
        Self {
            scene_id: String::new(),
            video_uri: String::new(),
            device_model: context.device.model.clone(),
            os_version: context.device.os_version.clone(),
            fps_source: video.fps(options.nominal_fps),
            width: video.width,
            height: video.height,
            capture_start_epoch_ms: context.started_at.timestamp_millis(),
            has_lidar: context.has_depth_sensor && collected.has_depth(),
            scale_hint_m_per_unit: options.scale_hint_m_per_unit,
            intended_space_type: context.intended_space_type.clone(),
            object_point_cloud_index: (mesh_count > 0).then_some(0),
            object_point_cloud_count: (mesh_count > 0).then_some(mesh_count),
            exposure_samples: collected.exposure.clone(),
            session_id: context.session_id.clone(),
            capture_source: context.capture_source,
            duration_s: video.duration(),
            video_frame_count: video.frame_count,
            streams,
            end_reason: collected.end_reason,
        }
    }

    /// Copy with the upload-time fields filled in; the original is left untouched
    pub fn patched(&self, scene_id: &str, video_uri: &str) -> Self {
        Self {
            scene_id: scene_id.to_string(),
            video_uri: video_uri.to_string(),
            ..self.clone()
        }
    }

    /// Pretty JSON with a trailing newline
    pub fn to_bytes(&self) -> CaptureResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> CaptureResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
