//! Immutable per-session context handed in by the target/reservation collaborator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture origin, used in the remote upload path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    #[default]
    Iphone,
    Glasses,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iphone => "iphone",
            Self::Glasses => "glasses",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaptureSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "iphone" => Ok(Self::Iphone),
            "glasses" => Ok(Self::Glasses),
            other => Err(format!("unknown capture source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub model: String,
    pub os_version: String,
}

impl DeviceDescriptor {
    pub fn new(model: impl Into<String>, os_version: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            os_version: os_version.into(),
        }
    }
}

/// Created once at recording start and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub target_id: Option<String>,
    pub reservation_id: Option<String>,
    pub creator_id: String,
    pub started_at: DateTime<Utc>,
    pub device: DeviceDescriptor,
    pub has_depth_sensor: bool,
    #[serde(default)]
    pub capture_source: CaptureSource,
    #[serde(default)]
    pub intended_space_type: Option<String>,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        creator_id: impl Into<String>,
        device: DeviceDescriptor,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            target_id: None,
            reservation_id: None,
            creator_id: creator_id.into(),
            started_at: Utc::now(),
            device,
            has_depth_sensor: false,
            capture_source: CaptureSource::default(),
            intended_space_type: None,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_reservation(mut self, reservation_id: impl Into<String>) -> Self {
        self.reservation_id = Some(reservation_id.into());
        self
    }

    pub fn with_depth_sensor(mut self, has_depth_sensor: bool) -> Self {
        self.has_depth_sensor = has_depth_sensor;
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn with_source(mut self, source: CaptureSource) -> Self {
        self.capture_source = source;
        self
    }

    pub fn with_space_type(mut self, space_type: impl Into<String>) -> Self {
        self.intended_space_type = Some(space_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_source_parse() {
        assert_eq!("Glasses".parse::<CaptureSource>(), Ok(CaptureSource::Glasses));
        assert!("drone".parse::<CaptureSource>().is_err());
    }

    #[test]
    fn test_context_roundtrips_through_session_json() {
        let ctx = SessionContext::new("s-1", "creator-9", DeviceDescriptor::new("iPhone15,3", "17.4"))
            .with_target("t-42")
            .with_depth_sensor(true);
        let json = serde_json::to_string(&ctx).unwrap();
        let back: SessionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
