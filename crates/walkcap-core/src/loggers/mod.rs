//! Per-stream append-only loggers
//!
//! Each enabled stream gets one logger running on its own task, fed by the stream's channel.
//! Loggers write JSON lines for structured samples and numbered PNG files for depth and
//! confidence maps. A write that still fails after one reopen-and-retry is a logger fault: the
//! task cancels the session's fault token, discards the rest of its channel and reports the
//! fault in its summary.

mod exposure;
mod frame_counter;
mod images;
mod jsonl;
mod mesh;
mod motion;
mod pose;
mod video;

pub use frame_counter::{FrameCounter, FrameTrack};
pub use mesh::mesh_file_name;
pub use pose::Intrinsics;
pub use video::VideoSummary;

pub(crate) use exposure::ExposureLogger;
pub(crate) use images::{ConfidenceLogger, DepthLogger};
pub(crate) use jsonl::read_jsonl;
pub(crate) use mesh::MeshLogger;
pub(crate) use motion::MotionLogger;
pub(crate) use pose::PoseLogger;
pub(crate) use video::{VideoFrameRecord, VideoLogger};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::CaptureResult;
use crate::session::router::{SampleReceiver, SampleRouter};
use crate::types::{ExposureSample, SensorSample, StreamKind};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MOTION_FILE: &str = "motion.jsonl";
pub const POSES_FILE: &str = "poses.jsonl";
pub const FRAMES_FILE: &str = "frames.jsonl";
pub const INTRINSICS_FILE: &str = "intrinsics.json";
pub const VIDEO_FILE: &str = "video.h264";
pub const VIDEO_INDEX_FILE: &str = "video_frames.jsonl";
pub const EXPOSURE_FILE: &str = "exposure.jsonl";
pub const DEPTH_DIR: &str = "depth";
pub const SMOOTHED_DEPTH_DIR: &str = "smoothed_depth";
pub const CONFIDENCE_DIR: &str = "confidence";
pub const MESH_DIR: &str = "meshes";

/// Per-frame image name shared by depth, smoothed depth and confidence
pub fn frame_file_name(frame_index: u64) -> String {
    format!("{:06}.png", frame_index)
}

/// Stream state as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamStatus {
    Enabled,
    Disabled { reason: String },
    Faulted { reason: String },
}

impl StreamStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Result of handing one sample to a logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Appended {
    Written,
    /// Rejected without a fault (stale frame index, unused variant, malformed map)
    Skipped,
}

/// Stream-specific data a logger hands back on close
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoggerOutput {
    #[default]
    None,
    Video(VideoSummary),
    Exposure(Vec<ExposureSample>),
}

/// What a logger task reports once its channel is drained
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerSummary {
    pub stream: StreamKind,
    pub records: u64,
    pub skipped: u64,
    pub fault: Option<String>,
    pub output: LoggerOutput,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LoggerOptions {
    pub sync_each_write: bool,
    pub record_smoothed_depth: bool,
}

#[async_trait]
pub(crate) trait StreamLogger: Send {
    fn stream(&self) -> StreamKind;

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended>;

    /// Flush everything and report stream-specific results
    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput>;
}

/// Open the logger for `stream` inside `dir`
pub(crate) async fn open_logger(
    stream: StreamKind,
    dir: &Path,
    options: LoggerOptions,
    counter: Arc<FrameCounter>,
    router: Arc<SampleRouter>,
) -> CaptureResult<Box<dyn StreamLogger>> {
    let logger: Box<dyn StreamLogger> = match stream {
        StreamKind::Video => Box::new(VideoLogger::open(dir, options, counter).await?),
        StreamKind::Motion => Box::new(MotionLogger::open(dir, options).await?),
        StreamKind::Pose => Box::new(PoseLogger::open(dir, options, counter, router).await?),
        StreamKind::Depth => Box::new(DepthLogger::open(dir, options, counter).await?),
        StreamKind::Confidence => Box::new(ConfidenceLogger::open(dir, counter).await?),
        StreamKind::Mesh => Box::new(MeshLogger::open(dir).await?),
        StreamKind::Exposure => Box::new(ExposureLogger::open(dir, options).await?),
    };
    debug!(stream = %stream, dir = %dir.display(), "logger opened");
    Ok(logger)
}

/// A logger running on its own task
pub(crate) struct LoggerHandle {
    stream: StreamKind,
    task: JoinHandle<LoggerSummary>,
}

impl LoggerHandle {
    pub(crate) fn spawn(
        mut logger: Box<dyn StreamLogger>,
        mut rx: SampleReceiver,
        fault: CancellationToken,
    ) -> Self {
        let stream = logger.stream();
        let task = tokio::spawn(async move {
            let mut records = 0u64;
            let mut skipped = 0u64;
            let mut fault_reason: Option<String> = None;

            while let Some(sample) = rx.recv().await {
                if fault_reason.is_some() {
                    skipped += 1;
                    continue;
                }
                match logger.append(sample).await {
                    Ok(Appended::Written) => records += 1,
                    Ok(Appended::Skipped) => skipped += 1,
                    Err(e) => {
                        error!(stream = %stream, error = %e, "logger fault");
                        fault_reason = Some(e.to_string());
                        fault.cancel();
                    }
                }
            }

            let output = match logger.close().await {
                Ok(output) => output,
                Err(e) => {
                    warn!(stream = %stream, error = %e, "logger failed to close cleanly");
                    if fault_reason.is_none() {
                        fault_reason = Some(e.to_string());
                        fault.cancel();
                    }
                    LoggerOutput::None
                }
            };

            debug!(stream = %stream, records, skipped, "logger drained");
            LoggerSummary {
                stream,
                records,
                skipped,
                fault: fault_reason,
                output,
            }
        });
        Self { stream, task }
    }

    pub(crate) fn stream(&self) -> StreamKind {
        self.stream
    }

    /// Wait until the channel is drained and the logger closed
    pub(crate) async fn finish(self) -> CaptureResult<LoggerSummary> {
        Ok(self.task.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;

    struct FlakyLogger {
        fail_at: u64,
        seen: u64,
    }

    #[async_trait]
    impl StreamLogger for FlakyLogger {
        fn stream(&self) -> StreamKind {
            StreamKind::Exposure
        }

        async fn append(&mut self, _sample: SensorSample) -> CaptureResult<Appended> {
            self.seen += 1;
            if self.seen == self.fail_at {
                return Err(CaptureError::logger_write("exposure", "disk full"));
            }
            Ok(Appended::Written)
        }

        async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
            Ok(LoggerOutput::None)
        }
    }

    fn sample(ts: f64) -> SensorSample {
        SensorSample::Exposure(ExposureSample {
            iso: 100.0,
            duration: 0.01,
            timestamp: ts,
        })
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(7), "000007.png");
        assert_eq!(frame_file_name(1_234_567), "1234567.png");
    }

    #[test]
    fn test_stream_status_serialization() {
        let json = serde_json::to_value(StreamStatus::Disabled {
            reason: "no depth sensor".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "disabled");
        assert_eq!(json["reason"], "no depth sensor");
    }

    #[tokio::test]
    async fn test_fault_cancels_token_and_discards_rest() {
        let router = SampleRouter::new();
        let rx = router.register(StreamKind::Exposure);
        router.open_gate();
        let fault = CancellationToken::new();
        let handle = LoggerHandle::spawn(
            Box::new(FlakyLogger {
                fail_at: 2,
                seen: 0,
            }),
            rx,
            fault.clone(),
        );

        for i in 0..4 {
            router.push(sample(i as f64));
        }
        router.close_gate();

        let summary = handle.finish().await.unwrap();
        assert!(fault.is_cancelled());
        assert_eq!(summary.records, 1);
        assert_eq!(summary.skipped, 2);
        assert!(summary.fault.unwrap().contains("disk full"));
    }
}
