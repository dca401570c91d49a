//! Inertial samples as `motion.jsonl`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use super::jsonl::JsonlWriter;
use super::{Appended, LoggerOptions, LoggerOutput, MOTION_FILE, StreamLogger};
use crate::error::CaptureResult;
use crate::types::{Attitude, SensorSample, StreamKind, Vec3};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MotionRecord<'a> {
    timestamp: f64,
    wall_time: &'a DateTime<Utc>,
    attitude: &'a Attitude,
    rotation_rate: &'a Vec3,
    gravity: &'a Vec3,
    user_acceleration: &'a Vec3,
}

pub(crate) struct MotionLogger {
    log: JsonlWriter,
}

impl MotionLogger {
    pub(crate) async fn open(dir: &Path, options: LoggerOptions) -> CaptureResult<Self> {
        let log = JsonlWriter::create(
            StreamKind::Motion,
            dir.join(MOTION_FILE),
            options.sync_each_write,
        )
        .await?;
        Ok(Self { log })
    }
}

#[async_trait]
impl StreamLogger for MotionLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Motion
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Motion(m) = sample else {
            return Ok(Appended::Skipped);
        };
        self.log
            .append(&MotionRecord {
                timestamp: m.timestamp,
                wall_time: &m.wall_time,
                attitude: &m.attitude,
                rotation_rate: &m.rotation_rate,
                gravity: &m.gravity,
                user_acceleration: &m.user_acceleration,
            })
            .await?;
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        self.log.close().await?;
        Ok(LoggerOutput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MotionSample;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_motion_line_uses_camel_case() {
        let dir = TempDir::new().unwrap();
        let options = LoggerOptions {
            sync_each_write: false,
            record_smoothed_depth: false,
        };
        let mut logger = MotionLogger::open(dir.path(), options).await.unwrap();
        logger
            .append(SensorSample::Motion(MotionSample {
                timestamp: 1.25,
                wall_time: Utc::now(),
                attitude: Attitude::default(),
                rotation_rate: Vec3::new(0.1, 0.2, 0.3),
                gravity: Vec3::new(0.0, -1.0, 0.0),
                user_acceleration: Vec3::default(),
            }))
            .await
            .unwrap();
        Box::new(logger).close().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(MOTION_FILE)).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["timestamp"], 1.25);
        assert_eq!(line["rotationRate"]["y"], 0.2);
        assert_eq!(line["attitude"]["quaternion"]["w"], 1.0);
        assert!(line["wallTime"].is_string());
        assert!(line.get("userAcceleration").is_some());
    }
}
