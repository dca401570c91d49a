//! End-to-end recording scenarios
//!
//! Drives a `SessionRecorder` with simulated and hand-fed sources, stops it and inspects the
//! sealed bundle on disk.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use walkcap_core::loggers::{
    CONFIDENCE_DIR, DEPTH_DIR, EXPOSURE_FILE, FRAMES_FILE, MOTION_FILE, POSES_FILE, VIDEO_FILE,
    VIDEO_INDEX_FILE, frame_file_name,
};
use walkcap_core::sensors::{
    Authorization, ExposureSampler, FixedExposureMeter, Requirement, SharedSensorSource,
    simulated_sources,
};
use walkcap_core::types::{
    ConfidenceMap, ConfidenceSample, DepthMap, DepthSample, DeviceDescriptor, PoseSample,
    VideoFrame,
};
use walkcap_core::{
    ArtifactPackager, CaptureResult, EndReason, EventBus, RecorderState, RecordingConfig,
    SampleSink, SealPolicy, SensorSample, SensorSource, SessionContext, SessionRecorder,
    SimulatedSensor, StopReason, StreamKind, recover_interrupted,
};

fn recorder(root: &Path, session_id: &str, has_depth: bool) -> SessionRecorder {
    let context = SessionContext::new(session_id, "creator-1", DeviceDescriptor::new("iPhone15,2", "17.4"))
        .with_target("target-1")
        .with_depth_sensor(has_depth);
    let config = RecordingConfig {
        sessions_root: root.to_path_buf(),
        sync_each_write: false,
        ..Default::default()
    };
    SessionRecorder::new(context, config, Arc::new(EventBus::default()))
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// Streams whose samples the test pushes by hand through the recorder's sink
struct ManualSource {
    streams: Vec<StreamKind>,
    requirement: Requirement,
}

impl ManualSource {
    fn shared(streams: Vec<StreamKind>, requirement: Requirement) -> SharedSensorSource {
        Arc::new(Self {
            streams,
            requirement,
        })
    }
}

#[async_trait]
impl SensorSource for ManualSource {
    fn label(&self) -> String {
        "manual".to_string()
    }

    fn streams(&self) -> Vec<StreamKind> {
        self.streams.clone()
    }

    fn requirement(&self) -> Requirement {
        self.requirement
    }

    async fn authorize(&self) -> Authorization {
        Authorization::Granted
    }

    async fn open(&self) -> CaptureResult<()> {
        Ok(())
    }

    async fn run(&self, _sink: SampleSink, cancel: CancellationToken) {
        cancel.cancelled().await;
    }
}

fn pose(frame_index: u64) -> SensorSample {
    SensorSample::Pose(PoseSample {
        frame_index,
        timestamp: frame_index as f64 / 30.0,
        transform: [0.0; 16],
        intrinsics: Some([1.0, 0.0, 0.5, 0.0, 1.0, 0.5, 0.0, 0.0, 1.0]),
        image_resolution: Some([640, 480]),
    })
}

fn manual_sources() -> Vec<SharedSensorSource> {
    vec![
        ManualSource::shared(vec![StreamKind::Video], Requirement::Required),
        ManualSource::shared(vec![StreamKind::Motion], Requirement::Required),
        ManualSource::shared(vec![StreamKind::Exposure], Requirement::Required),
        ManualSource::shared(
            vec![StreamKind::Pose, StreamKind::Depth, StreamKind::Confidence, StreamKind::Mesh],
            Requirement::Optional,
        ),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_no_depth_sensor_records_core_streams_only() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "no-depth", false);
    recorder
        .configure(simulated_sources(false, Duration::from_millis(500)))
        .await
        .unwrap();
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();

    let manifest = &bundle.manifest;
    assert!(!manifest.has_lidar);
    for stream in [
        StreamKind::Pose,
        StreamKind::Depth,
        StreamKind::Confidence,
        StreamKind::Mesh,
    ] {
        assert!(!manifest.streams[&stream].status.is_enabled(), "{stream} should be disabled");
    }
    for stream in [StreamKind::Video, StreamKind::Motion, StreamKind::Exposure] {
        assert!(manifest.streams[&stream].status.is_enabled());
    }

    assert!(bundle.root.join(VIDEO_FILE).is_file());
    assert!(bundle.root.join(MOTION_FILE).is_file());
    assert!(bundle.root.join(EXPOSURE_FILE).is_file());
    assert!(!bundle.root.join(POSES_FILE).exists());
    assert!(!bundle.root.join(DEPTH_DIR).exists());
}

#[tokio::test(start_paused = true)]
async fn test_thirty_second_recording_rates() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "thirty-seconds", false);
    recorder
        .configure(simulated_sources(false, Duration::from_millis(500)))
        .await
        .unwrap();
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();

    let motion = read_lines(&bundle.root.join(MOTION_FILE));
    let expected = 30.0 * 60.0;
    assert!((motion.len() as f64 - expected).abs() <= expected * 0.2);

    let stamps: Vec<f64> = motion
        .iter()
        .map(|m| m["timestamp"].as_f64().unwrap())
        .collect();
    let mean_interval = (stamps[stamps.len() - 1] - stamps[0]) / (stamps.len() - 1) as f64;
    assert!((mean_interval - 1.0 / 60.0).abs() <= (1.0 / 60.0) * 0.2);
    assert!(stamps.windows(2).all(|w| w[1] >= w[0]));

    let manifest = &bundle.manifest;
    assert!(!manifest.exposure_samples.is_empty());
    assert!(bundle.manifest_path.is_file());
    // Duration comes from the video log
    let video_span = manifest.video_frame_count as f64 / 30.0;
    assert!((manifest.duration_s - video_span).abs() < 0.5);
}

#[tokio::test]
async fn test_pose_burst_is_never_dropped() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "burst", true);
    let sources = vec![
        Arc::new(SimulatedSensor::camera()) as SharedSensorSource,
        Arc::new(SimulatedSensor::motion()),
        Arc::new(ExposureSampler::new(
            Arc::new(FixedExposureMeter::default()),
            Duration::from_millis(500),
        )),
        ManualSource::shared(
            vec![StreamKind::Pose, StreamKind::Depth, StreamKind::Confidence, StreamKind::Mesh],
            Requirement::Optional,
        ),
    ];
    recorder.configure(sources).await.unwrap();
    recorder.start().await.unwrap();

    let sink = recorder.sink().unwrap();
    let mut slowest = Duration::ZERO;
    for frame_index in 0..500u64 {
        let started = Instant::now();
        assert!(sink.push(pose(frame_index)));
        slowest = slowest.max(started.elapsed());
    }
    assert!(slowest < Duration::from_millis(50), "push took {slowest:?}");

    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();
    assert_eq!(bundle.manifest.streams[&StreamKind::Pose].records, 500);

    let poses = read_lines(&bundle.root.join(POSES_FILE));
    assert_eq!(poses.len(), 500);
    let indices: Vec<u64> = poses
        .iter()
        .map(|p| p["frameIndex"].as_u64().unwrap())
        .collect();
    assert!(indices.windows(2).all(|w| w[1] > w[0]));
}

#[tokio::test(start_paused = true)]
async fn test_depth_frames_are_aligned() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "aligned", true);
    recorder
        .configure(simulated_sources(true, Duration::from_millis(500)))
        .await
        .unwrap();
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();

    assert!(bundle.manifest.has_lidar);
    let poses: Vec<u64> = read_lines(&bundle.root.join(POSES_FILE))
        .iter()
        .map(|p| p["frameIndex"].as_u64().unwrap())
        .collect();
    let frames = read_lines(&bundle.root.join(FRAMES_FILE));
    let frame_indices: Vec<u64> = frames
        .iter()
        .map(|f| f["frameIndex"].as_u64().unwrap())
        .collect();

    assert!(!poses.is_empty());
    assert_eq!(poses, frame_indices);
    assert!(poses.windows(2).all(|w| w[1] > w[0]));
    for index in &poses {
        assert!(bundle.root.join(DEPTH_DIR).join(frame_file_name(*index)).is_file());
    }
    assert!(bundle.manifest.object_point_cloud_count.unwrap_or(0) >= 1);
}

#[tokio::test]
async fn test_abrupt_stop_keeps_every_pushed_sample() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "abrupt", false);
    let sources = vec![
        ManualSource::shared(vec![StreamKind::Video], Requirement::Required),
        ManualSource::shared(vec![StreamKind::Motion], Requirement::Required),
        ManualSource::shared(vec![StreamKind::Exposure], Requirement::Required),
    ];
    recorder.configure(sources).await.unwrap();
    recorder.start().await.unwrap();

    let sink = recorder.sink().unwrap();
    for i in 0..90u64 {
        assert!(sink.push(SensorSample::Video(VideoFrame {
            frame_index: i,
            timestamp: 100.0 + i as f64 / 30.0,
            width: 1280,
            height: 720,
            data: vec![(i % 255) as u8; 64],
        })));
    }
    let bundle = recorder
        .stop(StopReason::Abnormal("app moved to background".into()))
        .await
        .unwrap();

    assert_eq!(recorder.state(), RecorderState::Sealed);
    let manifest = &bundle.manifest;
    assert_eq!(manifest.end_reason, EndReason::Abnormal);
    assert_eq!(manifest.video_frame_count, 90);
    assert!((manifest.duration_s - 89.0 / 30.0).abs() < 1e-6);
    assert_eq!(
        std::fs::metadata(bundle.root.join(VIDEO_FILE)).unwrap().len(),
        90 * 64
    );
}

#[tokio::test]
async fn test_recovery_leaves_live_session_alone() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "live", false);
    recorder.configure(manual_sources()).await.unwrap();
    recorder.start().await.unwrap();

    let packager = ArtifactPackager::new(SealPolicy::Directory);
    let recovered = recover_interrupted(root.path(), &packager).await.unwrap();
    assert!(recovered.is_empty());
    assert_eq!(recorder.state(), RecorderState::Recording);

    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();
    assert_eq!(bundle.manifest.end_reason, EndReason::UserStop);
    assert!(recover_interrupted(root.path(), &packager).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_frame_log_skips_missing_depth_frames() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "gaps", true);
    recorder.configure(manual_sources()).await.unwrap();
    recorder.start().await.unwrap();

    let sink = recorder.sink().unwrap();
    for frame_index in 0..12u64 {
        assert!(sink.push(pose(frame_index)));
        if frame_index % 3 != 1 {
            assert!(sink.push(SensorSample::Depth(DepthSample {
                frame_index,
                timestamp: frame_index as f64 / 30.0,
                map: DepthMap {
                    width: 2,
                    height: 2,
                    meters: vec![1.0; 4],
                },
                is_smoothed: false,
            })));
        }
        if frame_index < 6 {
            assert!(sink.push(SensorSample::Confidence(ConfidenceSample {
                frame_index,
                timestamp: frame_index as f64 / 30.0,
                map: ConfidenceMap {
                    width: 2,
                    height: 2,
                    levels: vec![2; 4],
                },
            })));
        }
    }
    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();

    let frames = read_lines(&bundle.root.join(FRAMES_FILE));
    assert_eq!(frames.len(), 12);
    for frame in &frames {
        let index = frame["frameIndex"].as_u64().unwrap();
        for key in ["sceneDepthFile", "smoothedSceneDepthFile", "confidenceFile"] {
            if let Some(rel) = frame.get(key).and_then(|v| v.as_str()) {
                assert!(bundle.root.join(rel).is_file(), "{rel} referenced but missing");
            }
        }
        assert_eq!(frame.get("sceneDepthFile").is_some(), index % 3 != 1, "frame {index}");
        assert_eq!(frame.get("confidenceFile").is_some(), index < 6, "frame {index}");
    }
    assert!(!bundle.root.join(DEPTH_DIR).join(frame_file_name(1)).exists());
    assert!(bundle.root.join(CONFIDENCE_DIR).join(frame_file_name(5)).is_file());
}

#[tokio::test(start_paused = true)]
async fn test_video_frames_share_pose_indices() {
    let root = TempDir::new().unwrap();
    let mut recorder = recorder(root.path(), "shared-index", true);
    recorder
        .configure(simulated_sources(true, Duration::from_millis(500)))
        .await
        .unwrap();
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let bundle = recorder.stop(StopReason::UserStop).await.unwrap();

    let video: Vec<u64> = read_lines(&bundle.root.join(VIDEO_INDEX_FILE))
        .iter()
        .map(|v| v["frameIndex"].as_u64().unwrap())
        .collect();
    let poses: Vec<u64> = read_lines(&bundle.root.join(POSES_FILE))
        .iter()
        .map(|p| p["frameIndex"].as_u64().unwrap())
        .collect();

    assert!(video.len() > 30);
    assert!(!poses.is_empty());
    assert!(video.windows(2).all(|w| w[1] > w[0]));
    for index in &poses {
        assert!(video.binary_search(index).is_ok(), "pose {index} has no video frame");
    }
}
