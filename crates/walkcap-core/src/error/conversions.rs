//! From trait implementations for CaptureError conversions

use super::types::CaptureError;

impl From<std::io::Error> for CaptureError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(error.to_string());
        }
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<toml::de::Error> for CaptureError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML: {}", error))
    }
}

impl From<toml::ser::Error> for CaptureError {
    fn from(error: toml::ser::Error) -> Self {
        Self::config(format!("Failed to serialize TOML: {}", error))
    }
}

impl From<serde_yaml::Error> for CaptureError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("Failed to parse YAML: {}", error))
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(error: image::ImageError) -> Self {
        Self::io(format!("Image encoding failed: {}", error))
    }
}

impl From<reqwest::Error> for CaptureError {
    fn from(error: reqwest::Error) -> Self {
        let key = error.url().map(|u| u.path().trim_start_matches('/').to_string());
        if let Some(status) = error.status() {
            return Self::upload_status(
                status.as_u16(),
                key.unwrap_or_default(),
                error.to_string(),
            );
        }
        // No status: connection, timeout or body errors are worth another attempt
        if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            Self::UploadTransient {
                message: error.to_string(),
                key,
                status_code: None,
            }
        } else {
            Self::UploadPermanent {
                message: error.to_string(),
                key,
                status_code: None,
            }
        }
    }
}

impl From<tokio::task::JoinError> for CaptureError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::io(format!("Background task panicked: {}", error))
        }
    }
}
