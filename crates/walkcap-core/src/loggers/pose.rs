//! Camera poses, the per-frame log and the intrinsics document

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::frame_counter::{FrameCounter, FrameTrack};
use super::jsonl::JsonlWriter;
use super::{
    Appended, CONFIDENCE_DIR, DEPTH_DIR, FRAMES_FILE, INTRINSICS_FILE, LoggerOptions,
    LoggerOutput, POSES_FILE, SMOOTHED_DEPTH_DIR, StreamLogger, frame_file_name,
};
use crate::error::{CaptureError, CaptureResult};
use crate::session::router::SampleRouter;
use crate::types::{Matrix3, Matrix4, PoseSample, SensorSample, StreamKind};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoseRecord<'a> {
    frame_index: u64,
    timestamp: f64,
    transform: &'a Matrix4,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameRecord<'a> {
    frame_index: u64,
    timestamp: f64,
    camera_transform: &'a Matrix4,
    #[serde(skip_serializing_if = "Option::is_none")]
    intrinsics: Option<&'a Matrix3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_resolution: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scene_depth_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    smoothed_scene_depth_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence_file: Option<String>,
}

/// Pinhole intrinsics written once per session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl Intrinsics {
    /// From a row-major 3×3 camera matrix
    pub fn from_matrix(k: &Matrix3, resolution: [u32; 2]) -> Self {
        Self {
            fx: k[0],
            fy: k[4],
            cx: k[2],
            cy: k[5],
            width: resolution[0],
            height: resolution[1],
        }
    }
}

const IMAGE_TRACKS: [FrameTrack; 3] = [
    FrameTrack::Depth,
    FrameTrack::SmoothedDepth,
    FrameTrack::Confidence,
];

/// A frame record waiting for its depth and confidence files to settle
struct PendingFrame {
    frame_index: u64,
    timestamp: f64,
    transform: Matrix4,
    intrinsics: Option<Matrix3>,
    image_resolution: Option<[u32; 2]>,
}

pub(crate) struct PoseLogger {
    poses: JsonlWriter,
    frames: JsonlWriter,
    intrinsics_path: PathBuf,
    intrinsics_written: bool,
    /// Intrinsics could not be written; frames never reference image files
    degraded: bool,
    pending: VecDeque<PendingFrame>,
    counter: Arc<FrameCounter>,
    router: Arc<SampleRouter>,
}

impl PoseLogger {
    pub(crate) async fn open(
        dir: &Path,
        options: LoggerOptions,
        counter: Arc<FrameCounter>,
        router: Arc<SampleRouter>,
    ) -> CaptureResult<Self> {
        let sync = options.sync_each_write;
        let poses = JsonlWriter::create(StreamKind::Pose, dir.join(POSES_FILE), sync).await?;
        let frames = JsonlWriter::create(StreamKind::Pose, dir.join(FRAMES_FILE), sync).await?;
        Ok(Self {
            poses,
            frames,
            intrinsics_path: dir.join(INTRINSICS_FILE),
            intrinsics_written: false,
            degraded: false,
            pending: VecDeque::new(),
            counter,
            router,
        })
    }

    async fn write_intrinsics(&self, intrinsics: &Intrinsics) -> CaptureResult<()> {
        let body = serde_json::to_vec_pretty(intrinsics)?;
        let tmp = self.intrinsics_path.with_extension("json.tmp");
        let mut last_err = None;
        for _ in 0..2 {
            let attempt = async {
                tokio::fs::write(&tmp, &body).await?;
                tokio::fs::rename(&tmp, &self.intrinsics_path).await
            };
            match attempt.await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        let _ = tokio::fs::remove_file(&tmp).await;
        Err(match last_err {
            Some(e) => CaptureError::io_at(&e, &self.intrinsics_path),
            None => CaptureError::io("intrinsics write failed"),
        })
    }

    /// Without intrinsics the depth maps are unusable; fall back to a no-depth session
    fn degrade(&mut self, reason: &str) {
        warn!(reason, "intrinsics unavailable, disabling depth and confidence");
        let reason = format!("intrinsics unavailable: {}", reason);
        self.router.disable(StreamKind::Depth, reason.clone());
        self.router.disable(StreamKind::Confidence, reason);
        self.degraded = true;
    }

    async fn ensure_intrinsics(&mut self, pose: &PoseSample) {
        if self.intrinsics_written {
            return;
        }
        let (Some(k), Some(resolution)) = (pose.intrinsics.as_ref(), pose.image_resolution) else {
            return;
        };
        self.intrinsics_written = true;
        match self.write_intrinsics(&Intrinsics::from_matrix(k, resolution)).await {
            Ok(()) => info!(path = %self.intrinsics_path.display(), "intrinsics written"),
            Err(e) => self.degrade(&e.to_string()),
        }
    }

    /// Per-track file presence, or `None` while any image for the frame is still pending
    fn settled_refs(&self, frame_index: u64) -> Option<[bool; 3]> {
        if self.degraded {
            return Some([false; 3]);
        }
        let mut refs = [false; 3];
        for (slot, track) in refs.iter_mut().zip(IMAGE_TRACKS) {
            *slot = self.counter.resolution(track, frame_index)?;
        }
        Some(refs)
    }

    /// Write queued frame records, oldest first, up to the first unsettled one
    async fn flush_frames(&mut self, force: bool) -> CaptureResult<()> {
        while let Some(frame) = self.pending.front() {
            let refs = match self.settled_refs(frame.frame_index) {
                Some(refs) => refs,
                None if force => [false; 3],
                None => break,
            };
            let name = frame_file_name(frame.frame_index);
            let [depth, smoothed, confidence] = refs;
            self.frames
                .append(&FrameRecord {
                    frame_index: frame.frame_index,
                    timestamp: frame.timestamp,
                    camera_transform: &frame.transform,
                    intrinsics: frame.intrinsics.as_ref(),
                    image_resolution: frame.image_resolution,
                    scene_depth_file: depth.then(|| format!("{}/{}", DEPTH_DIR, name)),
                    smoothed_scene_depth_file: smoothed
                        .then(|| format!("{}/{}", SMOOTHED_DEPTH_DIR, name)),
                    confidence_file: confidence.then(|| format!("{}/{}", CONFIDENCE_DIR, name)),
                })
                .await?;
            self.pending.pop_front();
        }
        Ok(())
    }
}

#[async_trait]
impl StreamLogger for PoseLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Pose
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Pose(pose) = sample else {
            return Ok(Appended::Skipped);
        };
        if !self.counter.observe(FrameTrack::Pose, pose.frame_index) {
            warn!(
                frame_index = pose.frame_index,
                last = ?self.counter.last(FrameTrack::Pose),
                "dropping pose with non-increasing frame index"
            );
            return Ok(Appended::Skipped);
        }

        self.ensure_intrinsics(&pose).await;

        self.poses
            .append(&PoseRecord {
                frame_index: pose.frame_index,
                timestamp: pose.timestamp,
                transform: &pose.transform,
            })
            .await?;

        self.pending.push_back(PendingFrame {
            frame_index: pose.frame_index,
            timestamp: pose.timestamp,
            transform: pose.transform,
            intrinsics: pose.intrinsics,
            image_resolution: pose.image_resolution,
        });
        self.flush_frames(false).await?;
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        let mut this = *self;
        if !this.pending.is_empty() {
            this.counter.wait_finished(&IMAGE_TRACKS).await;
        }
        this.flush_frames(true).await?;
        this.poses.close().await?;
        this.frames.close().await?;
        Ok(LoggerOutput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> LoggerOptions {
        LoggerOptions {
            sync_each_write: false,
            record_smoothed_depth: true,
        }
    }

    fn pose(frame_index: u64) -> SensorSample {
        let mut transform = [0.0; 16];
        transform[0] = 1.0;
        SensorSample::Pose(PoseSample {
            frame_index,
            timestamp: frame_index as f64 / 30.0,
            transform,
            intrinsics: Some([500.0, 0.0, 320.0, 0.0, 501.0, 240.0, 0.0, 0.0, 1.0]),
            image_resolution: Some([640, 480]),
        })
    }

    fn lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    /// Counter with every image track open, as if the depth and confidence loggers were running
    fn image_counter() -> Arc<FrameCounter> {
        let counter = Arc::new(FrameCounter::new());
        for track in IMAGE_TRACKS {
            counter.activate(track);
        }
        counter
    }

    fn write_all(counter: &FrameCounter, frame_index: u64) {
        for track in IMAGE_TRACKS {
            counter.observe(track, frame_index);
            counter.mark_written(track, frame_index);
        }
    }

    #[tokio::test]
    async fn test_frame_log_references_derived_files() {
        let dir = TempDir::new().unwrap();
        let router = Arc::new(SampleRouter::new());
        let counter = image_counter();
        let mut logger = PoseLogger::open(dir.path(), options(), counter.clone(), router)
            .await
            .unwrap();
        write_all(&counter, 0);
        assert_eq!(logger.append(pose(0)).await.unwrap(), Appended::Written);
        assert_eq!(logger.append(pose(0)).await.unwrap(), Appended::Skipped);
        write_all(&counter, 3);
        assert_eq!(logger.append(pose(3)).await.unwrap(), Appended::Written);
        for track in IMAGE_TRACKS {
            counter.finish(track);
        }
        Box::new(logger).close().await.unwrap();

        let frames = lines(&dir.path().join(FRAMES_FILE));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["frameIndex"], 3);
        assert_eq!(frames[1]["sceneDepthFile"], "depth/000003.png");
        assert_eq!(frames[1]["smoothedSceneDepthFile"], "smoothed_depth/000003.png");
        assert_eq!(frames[1]["confidenceFile"], "confidence/000003.png");
        assert_eq!(frames[0]["cameraTransform"].as_array().unwrap().len(), 16);

        let intrinsics: Intrinsics =
            serde_json::from_slice(&std::fs::read(dir.path().join(INTRINSICS_FILE)).unwrap())
                .unwrap();
        assert_eq!(intrinsics.fy, 501.0);
        assert_eq!(intrinsics.cx, 320.0);
        assert_eq!(intrinsics.width, 640);
    }

    #[tokio::test]
    async fn test_frames_wait_for_pending_images() {
        let dir = TempDir::new().unwrap();
        let router = Arc::new(SampleRouter::new());
        let counter = image_counter();
        let mut logger = PoseLogger::open(dir.path(), options(), counter.clone(), router)
            .await
            .unwrap();

        logger.append(pose(0)).await.unwrap();
        logger.append(pose(1)).await.unwrap();
        assert_eq!(logger.pending.len(), 2);

        // Frame 0 lands for depth only, then the depth track moves past it
        counter.observe(FrameTrack::Depth, 0);
        counter.mark_written(FrameTrack::Depth, 0);
        counter.observe(FrameTrack::Depth, 1);
        counter.observe(FrameTrack::Confidence, 1);
        counter.mark_written(FrameTrack::Confidence, 1);
        counter.finish(FrameTrack::SmoothedDepth);
        logger.append(pose(2)).await.unwrap();
        assert_eq!(logger.pending.len(), 2);

        let close = tokio::spawn(Box::new(logger).close());
        counter.finish(FrameTrack::Depth);
        counter.finish(FrameTrack::Confidence);
        close.await.unwrap().unwrap();

        let frames = lines(&dir.path().join(FRAMES_FILE));
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["sceneDepthFile"], "depth/000000.png");
        assert!(frames[0].get("confidenceFile").is_none());
        assert!(frames[1].get("sceneDepthFile").is_none());
        assert_eq!(frames[1]["confidenceFile"], "confidence/000001.png");
        assert!(frames[2].get("sceneDepthFile").is_none());
        assert!(frames.iter().all(|f| f.get("smoothedSceneDepthFile").is_none()));
    }

    #[tokio::test]
    async fn test_intrinsics_failure_degrades_to_no_depth() {
        let dir = TempDir::new().unwrap();
        // A directory in the way makes the rename fail
        std::fs::create_dir(dir.path().join(INTRINSICS_FILE)).unwrap();
        let router = Arc::new(SampleRouter::new());
        let _depth_rx = router.register(StreamKind::Depth);
        let counter = image_counter();
        let mut logger = PoseLogger::open(dir.path(), options(), counter.clone(), router.clone())
            .await
            .unwrap();
        write_all(&counter, 0);
        logger.append(pose(0)).await.unwrap();
        Box::new(logger).close().await.unwrap();

        let disabled = router.disabled();
        assert!(disabled.contains_key(&StreamKind::Depth));
        assert!(disabled.contains_key(&StreamKind::Confidence));
        let frames = lines(&dir.path().join(FRAMES_FILE));
        assert!(frames[0].get("sceneDepthFile").is_none());
        assert!(frames[0].get("confidenceFile").is_none());
    }
}
