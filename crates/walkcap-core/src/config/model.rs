//! Configuration model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::default_home;
use crate::error::{CaptureError, CaptureResult};
use crate::recovery::RetryConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub recording: RecordingConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

impl CaptureConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> CaptureResult<()> {
        self.recording.validate()?;
        self.upload.validate()
    }
}

/// Form in which a finalized session is handed to the uploader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SealPolicy {
    /// Upload the session directory file by file
    #[default]
    Directory,
    /// Upload a single deterministic `.tar.gz` plus the manifest
    Archive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Parent of every session directory
    pub sessions_root: PathBuf,
    pub seal_policy: SealPolicy,
    /// Period of the exposure sampler
    #[serde(with = "humantime_serde")]
    pub exposure_interval: Duration,
    /// Frame rate written to the manifest when too few frames were captured to measure one
    pub nominal_fps: f64,
    /// `sync_data` after every log write
    pub sync_each_write: bool,
    pub record_smoothed_depth: bool,
    pub scale_hint_m_per_unit: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sessions_root: default_home().join("sessions"),
            seal_policy: SealPolicy::Directory,
            exposure_interval: Duration::from_millis(500),
            nominal_fps: 30.0,
            sync_each_write: true,
            record_smoothed_depth: true,
            scale_hint_m_per_unit: 1.0,
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> CaptureResult<()> {
        if !(self.nominal_fps.is_finite() && self.nominal_fps > 0.0) {
            return Err(CaptureError::config(format!(
                "recording.nominal_fps must be positive, got {}",
                self.nominal_fps
            )));
        }
        if self.exposure_interval.is_zero() {
            return Err(CaptureError::config(
                "recording.exposure_interval must be non-zero",
            ));
        }
        if !(self.scale_hint_m_per_unit.is_finite() && self.scale_hint_m_per_unit > 0.0) {
            return Err(CaptureError::config(
                "recording.scale_hint_m_per_unit must be positive",
            ));
        }
        Ok(())
    }
}

/// Remote object store selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Mirror objects into a local directory
    Local { root: PathBuf },
    /// PUT objects to `{base_url}/{key}`
    Http {
        base_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bearer_token: Option<String>,
        #[serde(default = "default_http_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Local {
            root: default_home().join("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub store: StoreConfig,
    pub max_concurrent_jobs: usize,
    pub max_concurrent_files: usize,
    pub retry: RetryConfig,
    /// Queue journal, rewritten after every job state change
    pub journal_path: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            max_concurrent_jobs: 2,
            max_concurrent_files: 4,
            retry: RetryConfig::default(),
            journal_path: default_home().join("upload-queue.json"),
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> CaptureResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(CaptureError::config(
                "upload.max_concurrent_jobs must be at least 1",
            ));
        }
        if self.max_concurrent_files == 0 {
            return Err(CaptureError::config(
                "upload.max_concurrent_files must be at least 1",
            ));
        }
        if let StoreConfig::Http { base_url, .. } = &self.store {
            if base_url.trim().is_empty() {
                return Err(CaptureError::config("upload.store.base_url is empty"));
            }
        }
        Ok(())
    }
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        format!("walkcap_core={0},walkcap={0},warn", self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recording.exposure_interval, Duration::from_millis(500));
        assert_eq!(config.upload.max_concurrent_jobs, 2);
        assert!(config.recording.sessions_root.ends_with("sessions"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = CaptureConfig::default();
        config.upload.max_concurrent_files = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_files"));
    }

    #[test]
    fn test_bad_fps_rejected() {
        let mut config = CaptureConfig::default();
        config.recording.nominal_fps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_http_base_url_rejected() {
        let mut config = CaptureConfig::default();
        config.upload.store = StoreConfig::Http {
            base_url: "  ".into(),
            bearer_token: None,
            timeout: default_http_timeout(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_toml() {
        let toml_str = r#"
            kind = "http"
            base_url = "https://uploads.example.com/bucket"
            timeout = "90s"
        "#;
        let store: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            store,
            StoreConfig::Http {
                base_url: "https://uploads.example.com/bucket".into(),
                bearer_token: None,
                timeout: Duration::from_secs(90),
            }
        );
    }

    #[test]
    fn test_logging_filter_directive() {
        let config = LoggingConfig {
            level: "trace".into(),
            ..Default::default()
        };
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(
            config.filter_directive(),
            "walkcap_core=trace,walkcap=trace,warn"
        );
    }
}
