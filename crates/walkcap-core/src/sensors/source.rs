//! Sensor source trait

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::CaptureResult;
use crate::session::SampleSink;
use crate::types::StreamKind;

/// Whether losing a source ends the session or only disables its streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// Outcome of the platform permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    /// Capability name reported in `PermissionDenied`
    Denied { capability: String },
}

/// A producer of timestamped samples for one or more streams
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Human-readable name used in logs
    fn label(&self) -> String;

    /// Streams this source feeds
    fn streams(&self) -> Vec<StreamKind>;

    fn requirement(&self) -> Requirement;

    async fn authorize(&self) -> Authorization;

    /// Bring the device up; an error here disables the source's streams (or aborts if required)
    async fn open(&self) -> CaptureResult<()>;

    /// Push samples into `sink` until `cancel` fires
    async fn run(&self, sink: SampleSink, cancel: CancellationToken);
}

pub type SharedSensorSource = Arc<dyn SensorSource>;
