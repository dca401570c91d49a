//! Walkcap Core Library
//!
//! This crate provides the capture-and-upload pipeline behind walkcap: sensor sources, per-stream
//! loggers, the session recorder state machine, the artifact packager and the durable upload
//! queue.

pub mod config;
pub mod error;
pub mod events;
pub mod loggers;
pub mod packaging;
pub mod recovery;
pub mod sensors;
pub mod session;
pub mod types;
pub mod upload;

// Re-export commonly used types
pub use config::{CaptureConfig, RecordingConfig, SealPolicy, StoreConfig, UploadConfig};
pub use error::{CaptureError, CaptureResult};
pub use events::{CaptureEvent, EventBus, SharedEventBus};
pub use loggers::StreamStatus;
pub use packaging::{ArtifactBundle, ArtifactPackager, EndReason, Manifest};
pub use sensors::{SensorSource, SimulatedSensor};
pub use session::{RecorderState, SampleSink, SessionRecorder, StopReason, recover_interrupted};
pub use types::{CaptureSource, SensorSample, SessionContext, StreamKind};
pub use upload::{JobState, RemoteStore, UploadMetadata, UploadQueue};
