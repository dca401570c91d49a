//! Shared data model: stream kinds, sensor samples, session context

mod context;
mod sample;

pub use context::{CaptureSource, DeviceDescriptor, SessionContext};
pub use sample::{
    Attitude, ConfidenceMap, ConfidenceSample, DepthMap, DepthSample, ExposureSample, Matrix3,
    Matrix4, MeshSample, MotionSample, PoseSample, Quaternion, SensorSample, Vec3, VideoFrame,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One independently-clocked source of timestamped samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Motion,
    Pose,
    Depth,
    Confidence,
    Mesh,
    Exposure,
}

impl StreamKind {
    /// Every stream, in logger close order (video first so duration is final)
    pub const ALL: [StreamKind; 7] = [
        StreamKind::Video,
        StreamKind::Motion,
        StreamKind::Pose,
        StreamKind::Depth,
        StreamKind::Confidence,
        StreamKind::Mesh,
        StreamKind::Exposure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Motion => "motion",
            Self::Pose => "pose",
            Self::Depth => "depth",
            Self::Confidence => "confidence",
            Self::Mesh => "mesh",
            Self::Exposure => "exposure",
        }
    }

    /// Streams produced by the pose/depth tracking subsystem
    pub fn requires_depth_sensor(&self) -> bool {
        matches!(
            self,
            Self::Pose | Self::Depth | Self::Confidence | Self::Mesh
        )
    }

    /// Streams whose loss ends the session
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Video | Self::Motion | Self::Exposure)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_closes_first() {
        assert_eq!(StreamKind::ALL[0], StreamKind::Video);
    }

    #[test]
    fn test_depth_group() {
        let group: Vec<_> = StreamKind::ALL
            .iter()
            .filter(|s| s.requires_depth_sensor())
            .collect();
        assert_eq!(
            group,
            vec![
                &StreamKind::Pose,
                &StreamKind::Depth,
                &StreamKind::Confidence,
                &StreamKind::Mesh
            ]
        );
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&StreamKind::Confidence).unwrap(),
            "\"confidence\""
        );
    }
}
