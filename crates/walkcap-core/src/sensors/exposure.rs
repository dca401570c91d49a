//! Timer-driven exposure telemetry

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::source::{Authorization, Requirement, SensorSource};
use crate::error::CaptureResult;
use crate::session::SampleSink;
use crate::types::{ExposureSample, SensorSample, StreamKind};

/// Reads the camera's current exposure settings
pub trait ExposureMeter: Send + Sync {
    /// `(iso, exposure duration in seconds)`, or `None` while the camera is not ready
    fn read(&self) -> Option<(f32, f64)>;
}

/// Meter that always reports the same settings
#[derive(Debug, Clone, Copy)]
pub struct FixedExposureMeter {
    pub iso: f32,
    pub duration: f64,
}

impl Default for FixedExposureMeter {
    fn default() -> Self {
        Self {
            iso: 100.0,
            duration: 1.0 / 120.0,
        }
    }
}

impl ExposureMeter for FixedExposureMeter {
    fn read(&self) -> Option<(f32, f64)> {
        Some((self.iso, self.duration))
    }
}

/// Samples an [`ExposureMeter`] on a fixed period
pub struct ExposureSampler {
    meter: Arc<dyn ExposureMeter>,
    interval: Duration,
}

impl ExposureSampler {
    pub fn new(meter: Arc<dyn ExposureMeter>, interval: Duration) -> Self {
        Self { meter, interval }
    }
}

#[async_trait]
impl SensorSource for ExposureSampler {
    fn label(&self) -> String {
        "exposure-sampler".to_string()
    }

    fn streams(&self) -> Vec<StreamKind> {
        vec![StreamKind::Exposure]
    }

    fn requirement(&self) -> Requirement {
        Requirement::Required
    }

    async fn authorize(&self) -> Authorization {
        Authorization::Granted
    }

    async fn open(&self) -> CaptureResult<()> {
        Ok(())
    }

    async fn run(&self, sink: SampleSink, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let clock = sink.clock();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some((iso, duration)) = self.meter.read() {
                        sink.push(SensorSample::Exposure(ExposureSample {
                            iso,
                            duration,
                            timestamp: clock.now(),
                        }));
                    }
                }
            }
        }
        debug!("exposure sampler stopped");
    }
}
