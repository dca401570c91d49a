//! Recorder state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CaptureError, CaptureResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Configuring,
    Recording,
    Finalizing,
    Sealed,
    Aborted,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Sealed => "sealed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Sources authorized
    Configure,
    /// Session directory, loggers and subscriptions in place
    Start,
    /// Explicit stop or abnormal termination
    Stop,
    /// Bundle sealed
    Seal,
    /// Unrecoverable failure before or during finalization
    Abort,
}

/// Next state for `event` in `state`
///
/// A recording that has started can only end through `Finalizing`; `Abort` is accepted while
/// configuring and finalizing, never while recording.
pub fn transition(state: RecorderState, event: RecorderEvent) -> CaptureResult<RecorderState> {
    use RecorderEvent as E;
    use RecorderState as S;

    match (state, event) {
        (S::Idle, E::Configure) => Ok(S::Configuring),
        (S::Configuring, E::Start) => Ok(S::Recording),
        (S::Recording, E::Stop) => Ok(S::Finalizing),
        (S::Finalizing, E::Seal) => Ok(S::Sealed),
        (S::Configuring | S::Finalizing, E::Abort) => Ok(S::Aborted),
        (state, event) => Err(CaptureError::invalid_transition(state, event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RecorderEvent as E;
    use RecorderState as S;

    #[test]
    fn test_happy_path() {
        let mut state = S::Idle;
        for event in [E::Configure, E::Start, E::Stop, E::Seal] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, S::Sealed);
    }

    #[test]
    fn test_abort_paths() {
        assert_eq!(transition(S::Configuring, E::Abort).unwrap(), S::Aborted);
        assert_eq!(transition(S::Finalizing, E::Abort).unwrap(), S::Aborted);
        assert!(transition(S::Recording, E::Abort).is_err());
        assert!(transition(S::Idle, E::Abort).is_err());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for state in [S::Sealed, S::Aborted] {
            for event in [E::Configure, E::Start, E::Stop, E::Seal, E::Abort] {
                assert!(transition(state, event).is_err());
            }
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = transition(S::Idle, E::Stop).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidTransition { .. }));
    }
}
