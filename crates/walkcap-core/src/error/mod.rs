//! Error types for walkcap
//!
//! Every fallible operation in the capture pipeline returns [`CaptureResult`]. The variants map
//! one-to-one onto the failure taxonomy of the pipeline:
//! - `PermissionDenied`: a required sensor is not authorized, the session never starts
//! - `LoggerOpenFailure` / `LoggerWrite`: disk trouble on a stream log
//! - `Packaging`: a required file is missing at seal time
//! - `UploadTransient` / `UploadPermanent`: remote store failures, retried or surfaced
//!
//! An optional stream that cannot start is not an error; see
//! [`StreamStatus`](crate::loggers::StreamStatus).

mod constructors;
mod conversions;
mod types;

pub use types::{CaptureError, CaptureResult, OptionExt, ResultExt};
