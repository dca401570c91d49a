//! Synthetic sensor producers for dry runs and tests

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::exposure::{ExposureSampler, FixedExposureMeter};
use super::source::{Authorization, Requirement, SensorSource, SharedSensorSource};
use crate::error::{CaptureError, CaptureResult};
use crate::session::SampleSink;
use crate::types::{
    Attitude, ConfidenceMap, ConfidenceSample, DepthMap, DepthSample, MeshSample, MotionSample,
    PoseSample, Quaternion, SensorSample, StreamKind, Vec3, VideoFrame,
};

/// Which device a [`SimulatedSensor`] stands in for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedKind {
    /// Encoded video frames at 30 Hz
    Camera,
    /// Inertial samples at 60 Hz
    Motion,
    /// Pose, depth and confidence at 30 Hz plus a mesh snapshot every second
    DepthTracking,
}

const MAP_SIZE: (u32, u32) = (32, 24);

/// The camera frame most recently captured
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameTick {
    index: u64,
    timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    kind: SimulatedKind,
    rate_hz: f64,
    authorized: bool,
    fail_open: bool,
    /// Camera ticks; the camera publishes, a synced tracker follows
    frames: Arc<watch::Sender<Option<FrameTick>>>,
    follows_camera: bool,
}

impl SimulatedSensor {
    pub fn new(kind: SimulatedKind) -> Self {
        let rate_hz = match kind {
            SimulatedKind::Camera | SimulatedKind::DepthTracking => 30.0,
            SimulatedKind::Motion => 60.0,
        };
        Self {
            kind,
            rate_hz,
            authorized: true,
            fail_open: false,
            frames: Arc::new(watch::Sender::new(None)),
            follows_camera: false,
        }
    }

    pub fn camera() -> Self {
        Self::new(SimulatedKind::Camera)
    }

    pub fn motion() -> Self {
        Self::new(SimulatedKind::Motion)
    }

    pub fn depth_tracking() -> Self {
        Self::new(SimulatedKind::DepthTracking)
    }

    /// Emit tracking data for each frame `camera` captures, with the camera's frame index
    pub fn synced_with(mut self, camera: &SimulatedSensor) -> Self {
        self.frames = camera.frames.clone();
        self.follows_camera = true;
        self
    }

    /// Simulate the user declining the permission prompt
    pub fn denied(mut self) -> Self {
        self.authorized = false;
        self
    }

    /// Simulate hardware that refuses to start
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn capability(&self) -> &'static str {
        match self.kind {
            SimulatedKind::Camera => "camera",
            SimulatedKind::Motion => "motion",
            SimulatedKind::DepthTracking => "depth-tracking",
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(0.001))
    }

    fn emit(&self, sink: &SampleSink, tick: u64) {
        let t = sink.clock().now();
        match self.kind {
            SimulatedKind::Camera => {
                // Opaque payload; a fake NAL start code keeps the file recognisable
                let mut data = vec![0x00, 0x00, 0x00, 0x01, 0x65];
                data.extend_from_slice(&tick.to_be_bytes());
                self.frames.send_replace(Some(FrameTick {
                    index: tick,
                    timestamp: t,
                }));
                sink.push(SensorSample::Video(VideoFrame {
                    frame_index: tick,
                    timestamp: t,
                    width: 1920,
                    height: 1440,
                    data,
                }));
            }
            SimulatedKind::Motion => {
                let phase = t * std::f64::consts::TAU * 0.5;
                sink.push(SensorSample::Motion(MotionSample {
                    timestamp: t,
                    wall_time: Utc::now(),
                    attitude: Attitude {
                        roll: 0.05 * phase.sin(),
                        pitch: 0.02 * phase.cos(),
                        yaw: 0.1 * t,
                        quaternion: Quaternion::default(),
                    },
                    rotation_rate: Vec3::new(0.01 * phase.cos(), 0.0, 0.1),
                    gravity: Vec3::new(0.0, -1.0, 0.0),
                    user_acceleration: Vec3::new(0.02 * phase.sin(), 0.0, 0.0),
                }));
            }
            SimulatedKind::DepthTracking => self.emit_tracking(sink, tick, t),
        }
    }

    fn emit_tracking(&self, sink: &SampleSink, frame_index: u64, t: f64) {
        let (width, height) = MAP_SIZE;
        let mut transform = [0.0f32; 16];
        for i in 0..4 {
            transform[i * 5] = 1.0;
        }
        // Walk forward half a metre per second
        transform[11] = -(0.5 * t) as f32;

        sink.push(SensorSample::Pose(PoseSample {
            frame_index,
            timestamp: t,
            transform,
            intrinsics: Some([
                1450.0, 0.0, 960.0, //
                0.0, 1450.0, 720.0, //
                0.0, 0.0, 1.0,
            ]),
            image_resolution: Some([1920, 1440]),
        }));

        let pixels = (width * height) as usize;
        let meters: Vec<f32> = (0..pixels)
            .map(|i| 1.5 + (i % width as usize) as f32 * 0.01)
            .collect();
        for is_smoothed in [false, true] {
            sink.push(SensorSample::Depth(DepthSample {
                frame_index,
                timestamp: t,
                map: DepthMap {
                    width,
                    height,
                    meters: meters.clone(),
                },
                is_smoothed,
            }));
        }
        sink.push(SensorSample::Confidence(ConfidenceSample {
            frame_index,
            timestamp: t,
            map: ConfidenceMap {
                width,
                height,
                levels: (0..pixels).map(|i| (i % 3) as u8).collect(),
            },
        }));

        let frames_per_mesh = self.rate_hz.round().max(1.0) as u64;
        if frame_index % frames_per_mesh == 0 {
            sink.push(SensorSample::Mesh(MeshSample {
                id: format!("anchor-{}", frame_index / frames_per_mesh % 4),
                timestamp: t,
                vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                indices: vec![0, 1, 2],
                normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
            }));
        }
    }
}

impl SimulatedSensor {
    async fn follow_camera(&self, sink: SampleSink, cancel: CancellationToken) {
        let mut frames = self.frames.subscribe();
        let mut followed = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let tick = *frames.borrow_and_update();
                    if let Some(tick) = tick {
                        self.emit_tracking(&sink, tick.index, tick.timestamp);
                        followed += 1;
                    }
                }
            }
        }
        debug!(source = %self.label(), frames = followed, "simulated tracker stopped");
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    fn label(&self) -> String {
        format!("simulated-{}", self.capability())
    }

    fn streams(&self) -> Vec<StreamKind> {
        match self.kind {
            SimulatedKind::Camera => vec![StreamKind::Video],
            SimulatedKind::Motion => vec![StreamKind::Motion],
            SimulatedKind::DepthTracking => vec![
                StreamKind::Pose,
                StreamKind::Depth,
                StreamKind::Confidence,
                StreamKind::Mesh,
            ],
        }
    }

    fn requirement(&self) -> Requirement {
        match self.kind {
            SimulatedKind::DepthTracking => Requirement::Optional,
            _ => Requirement::Required,
        }
    }

    async fn authorize(&self) -> Authorization {
        if self.authorized {
            Authorization::Granted
        } else {
            Authorization::Denied {
                capability: self.capability().to_string(),
            }
        }
    }

    async fn open(&self) -> CaptureResult<()> {
        if self.fail_open {
            return Err(CaptureError::io(format!(
                "{} failed to start",
                self.capability()
            )));
        }
        Ok(())
    }

    async fn run(&self, sink: SampleSink, cancel: CancellationToken) {
        if self.follows_camera {
            self.follow_camera(sink, cancel).await;
            return;
        }
        let mut ticker = tokio::time::interval(self.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.emit(&sink, tick);
                    tick += 1;
                }
            }
        }
        debug!(source = %self.label(), ticks = tick, "simulated source stopped");
    }
}

/// Camera, motion, exposure and (when present) depth tracking, as a device would expose them
pub fn simulated_sources(
    has_depth_sensor: bool,
    exposure_interval: Duration,
) -> Vec<SharedSensorSource> {
    let camera = SimulatedSensor::camera();
    let tracker = SimulatedSensor::depth_tracking().synced_with(&camera);
    let mut sources: Vec<SharedSensorSource> = vec![
        Arc::new(camera),
        Arc::new(SimulatedSensor::motion()),
        Arc::new(ExposureSampler::new(
            Arc::new(FixedExposureMeter::default()),
            exposure_interval,
        )),
    ];
    if has_depth_sensor {
        sources.push(Arc::new(tracker));
    }
    sources
}
