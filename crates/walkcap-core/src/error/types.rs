//! Core error type for the capture pipeline

use thiserror::Error;

/// Result type alias for capture pipeline operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> CaptureResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> CaptureResult<T>;
}

impl<T, E: Into<CaptureError>> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> CaptureResult<T> {
        self.map_err(|e| e.into().with_context_str(context.to_string()))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> CaptureResult<T> {
        self.map_err(|e| e.into().with_context_str(f().to_string()))
    }
}

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to a `NotFound` error with the given message
    fn context<C: std::fmt::Display>(self, context: C) -> CaptureResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context<C: std::fmt::Display>(self, context: C) -> CaptureResult<T> {
        self.ok_or_else(|| CaptureError::not_found(context.to_string()))
    }
}

/// Main error type for walkcap
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    /// One or more required sensor capabilities are not authorized
    #[error("Permission denied: missing {}", .missing.join(", "))]
    PermissionDenied { missing: Vec<String> },

    /// A required stream log could not be opened; aborts the session
    #[error("Failed to open {stream} log: {message}")]
    LoggerOpenFailure {
        stream: String,
        message: String,
        context: Option<String>,
    },

    /// A stream log write failed even after the write-layer retry
    #[error("Failed to write {stream} log: {message}")]
    LoggerWrite { stream: String, message: String },

    /// A required file was missing at seal time
    #[error("Packaging error: {message}")]
    Packaging {
        message: String,
        path: Option<String>,
    },

    /// Network or 5xx-class failure, retried automatically
    #[error("Transient upload failure: {message}")]
    UploadTransient {
        message: String,
        key: Option<String>,
        status_code: Option<u16>,
    },

    /// Quota, auth or other 4xx-class failure, requires a manual retry
    #[error("Upload failed: {message}")]
    UploadPermanent {
        message: String,
        key: Option<String>,
        status_code: Option<u16>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        context: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Recorder state machine rejected an event
    #[error("Invalid transition: {event} while {state}")]
    InvalidTransition { state: String, event: String },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,
}
