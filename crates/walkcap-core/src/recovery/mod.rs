//! Error recovery for the upload path
//!
//! Errors are classified as transient or permanent; transient ones are retried with
//! exponential backoff until the job's retry budget is spent.

pub mod retry;

pub use retry::{RetryConfig, RetryDecision, RetryPolicy};

use crate::error::CaptureError;

/// Error classification for recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on retry
    Transient,
    /// Permanent errors that will not succeed on retry
    Permanent,
}

/// Classify pipeline errors into error classes
pub fn classify_error(error: &CaptureError) -> ErrorClass {
    match error {
        CaptureError::UploadTransient { .. } => ErrorClass::Transient,
        CaptureError::UploadPermanent { .. } => ErrorClass::Permanent,
        CaptureError::Io { message, .. } => {
            let msg = message.to_lowercase();
            if msg.contains("permission denied") || msg.contains("no such file") {
                ErrorClass::Permanent
            } else {
                ErrorClass::Transient
            }
        }
        CaptureError::LoggerWrite { .. } => ErrorClass::Transient,
        CaptureError::PermissionDenied { .. }
        | CaptureError::LoggerOpenFailure { .. }
        | CaptureError::Packaging { .. }
        | CaptureError::Json { .. }
        | CaptureError::Config { .. }
        | CaptureError::InvalidTransition { .. }
        | CaptureError::NotFound { .. }
        | CaptureError::Cancelled => ErrorClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_upload_errors() {
        assert_eq!(
            classify_error(&CaptureError::upload_status(502, "scenes/a", "bad gateway")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&CaptureError::upload_status(401, "scenes/a", "unauthorized")),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_classify_io_errors() {
        assert_eq!(
            classify_error(&CaptureError::io("connection reset by peer")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&CaptureError::io("Permission denied (os error 13)")),
            ErrorClass::Permanent
        );
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(classify_error(&missing.into()), ErrorClass::Permanent);
    }

    #[test]
    fn test_packaging_is_never_retried() {
        assert_eq!(
            classify_error(&CaptureError::packaging("manifest missing")),
            ErrorClass::Permanent
        );
    }
}
