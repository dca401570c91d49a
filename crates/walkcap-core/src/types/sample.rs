//! Sensor samples delivered by the external capture collaborators
//!
//! Every sample carries a monotonic capture timestamp in seconds. Within one stream timestamps
//! are non-decreasing; nothing is assumed about ordering across streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StreamKind;

/// 4×4 row-major matrix (camera-to-world for poses)
pub type Matrix4 = [f32; 16];

/// 3×3 row-major matrix (camera intrinsics)
pub type Matrix3 = [f32; 9];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub quaternion: Quaternion,
}

/// One encoded video sample buffer; the bytes are opaque to the pipeline
///
/// `frame_index` is the camera frame the buffer was encoded from, the same index the pose,
/// depth and confidence samples of that frame carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFrame {
    pub frame_index: u64,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: f64,
    pub wall_time: DateTime<Utc>,
    pub attitude: Attitude,
    pub rotation_rate: Vec3,
    pub gravity: Vec3,
    pub user_acceleration: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub frame_index: u64,
    pub timestamp: f64,
    pub transform: Matrix4,
    pub intrinsics: Option<Matrix3>,
    pub image_resolution: Option<[u32; 2]>,
}

/// Depth in meters, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub meters: Vec<f32>,
}

impl DepthMap {
    /// Convert to 16-bit millimeters; non-finite and negative depths map to 0
    pub fn to_millimeters(&self) -> Vec<u16> {
        self.meters
            .iter()
            .map(|m| {
                if m.is_finite() && *m > 0.0 {
                    (m * 1000.0).round().min(u16::MAX as f32) as u16
                } else {
                    0
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSample {
    pub frame_index: u64,
    pub timestamp: f64,
    pub map: DepthMap,
    pub is_smoothed: bool,
}

/// Tri-level confidence (0 low, 1 medium, 2 high), row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMap {
    pub width: u32,
    pub height: u32,
    pub levels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSample {
    pub frame_index: u64,
    pub timestamp: f64,
    pub map: ConfidenceMap,
}

/// World-space mesh anchor snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSample {
    pub id: String,
    pub timestamp: f64,
    pub vertices: Vec<[f32; 3]>,
    /// Triangle indices into `vertices`, three per face
    pub indices: Vec<u32>,
    pub normals: Option<Vec<[f32; 3]>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureSample {
    pub iso: f32,
    /// Exposure duration in seconds
    #[serde(rename = "exposure_duration")]
    pub duration: f64,
    pub timestamp: f64,
}

/// Tagged union over every stream kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum SensorSample {
    Video(VideoFrame),
    Motion(MotionSample),
    Pose(PoseSample),
    Depth(DepthSample),
    Confidence(ConfidenceSample),
    Mesh(MeshSample),
    Exposure(ExposureSample),
}

impl SensorSample {
    pub fn stream(&self) -> StreamKind {
        match self {
            Self::Video(_) => StreamKind::Video,
            Self::Motion(_) => StreamKind::Motion,
            Self::Pose(_) => StreamKind::Pose,
            Self::Depth(_) => StreamKind::Depth,
            Self::Confidence(_) => StreamKind::Confidence,
            Self::Mesh(_) => StreamKind::Mesh,
            Self::Exposure(_) => StreamKind::Exposure,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Video(f) => f.timestamp,
            Self::Motion(m) => m.timestamp,
            Self::Pose(p) => p.timestamp,
            Self::Depth(d) => d.timestamp,
            Self::Confidence(c) => c.timestamp,
            Self::Mesh(m) => m.timestamp,
            Self::Exposure(e) => e.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_to_millimeters() {
        let map = DepthMap {
            width: 4,
            height: 1,
            meters: vec![1.2345, -1.0, f32::NAN, 100.0],
        };
        assert_eq!(map.to_millimeters(), vec![1235, 0, 0, u16::MAX]);
    }

    #[test]
    fn test_exposure_field_name() {
        let sample = ExposureSample {
            iso: 100.0,
            duration: 0.01,
            timestamp: 2.5,
        };
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["exposure_duration"], 0.01);
    }

    #[test]
    fn test_sample_stream_and_timestamp() {
        let sample = SensorSample::Exposure(ExposureSample {
            iso: 50.0,
            duration: 0.02,
            timestamp: 7.0,
        });
        assert_eq!(sample.stream(), StreamKind::Exposure);
        assert_eq!(sample.timestamp(), 7.0);
    }
}
