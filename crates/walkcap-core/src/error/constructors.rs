//! Constructor methods for CaptureError

use super::types::CaptureError;
use std::path::Path;

impl CaptureError {
    /// Create a permission error listing the missing capabilities
    pub fn permission_denied<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PermissionDenied {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a logger open failure for a stream
    pub fn logger_open(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoggerOpenFailure {
            stream: stream.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a logger write failure for a stream
    pub fn logger_write(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoggerWrite {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a packaging error
    pub fn packaging(message: impl Into<String>) -> Self {
        Self::Packaging {
            message: message.into(),
            path: None,
        }
    }

    /// Create a packaging error for a missing or unreadable path
    pub fn packaging_at(message: impl Into<String>, path: &Path) -> Self {
        Self::Packaging {
            message: message.into(),
            path: Some(path.display().to_string()),
        }
    }

    /// Create a transient upload error
    pub fn upload_transient(message: impl Into<String>) -> Self {
        Self::UploadTransient {
            message: message.into(),
            key: None,
            status_code: None,
        }
    }

    /// Create a permanent upload error
    pub fn upload_permanent(message: impl Into<String>) -> Self {
        Self::UploadPermanent {
            message: message.into(),
            key: None,
            status_code: None,
        }
    }

    /// Classify an HTTP status into a transient or permanent upload error
    pub fn upload_status(status: u16, key: impl Into<String>, body: impl Into<String>) -> Self {
        let key = key.into();
        let message = format!("{} returned HTTP {}: {}", key, status, body.into());
        if status >= 500 || status == 408 || status == 429 {
            Self::UploadTransient {
                message,
                key: Some(key),
                status_code: Some(status),
            }
        } else {
            Self::UploadPermanent {
                message,
                key: Some(key),
                status_code: Some(status),
            }
        }
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            context: None,
        }
    }

    /// Create an IO error tied to a path; a missing path becomes `NotFound`
    pub fn io_at(error: &std::io::Error, path: &Path) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(format!("{}: {}", path.display(), error));
        }
        Self::Io {
            message: error.to_string(),
            path: Some(path.display().to_string()),
            context: None,
        }
    }

    /// Create a new JSON error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(state: impl std::fmt::Debug, event: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            state: format!("{:?}", state),
            event: format!("{:?}", event),
        }
    }

    /// Create a new not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Attach context to variants that carry it; other variants get it folded into the message
    pub(crate) fn with_context_str(self, ctx: String) -> Self {
        match self {
            Self::Io {
                message, path, ..
            } => Self::Io {
                message,
                path,
                context: Some(ctx),
            },
            Self::Json { message, .. } => Self::Json {
                message,
                context: Some(ctx),
            },
            Self::Config { message, .. } => Self::Config {
                message,
                context: Some(ctx),
            },
            Self::LoggerOpenFailure {
                stream, message, ..
            } => Self::LoggerOpenFailure {
                stream,
                message,
                context: Some(ctx),
            },
            Self::Packaging { message, path } => Self::Packaging {
                message: format!("{}: {}", ctx, message),
                path,
            },
            other => other,
        }
    }
}
