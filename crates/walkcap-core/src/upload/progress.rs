//! Monotonic byte-level progress for one job

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct State {
    per_file: HashMap<String, u64>,
    reported: f64,
}

/// Tracks the highest byte count seen per file against a total fixed at enqueue
///
/// A file that restarts after a failed attempt reports lower counts again; the per-file
/// high-water mark keeps the overall fraction from going backwards.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    state: Mutex<State>,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            state: Mutex::new(State::default()),
        }
    }

    /// Record `bytes` sent so far for `file`; returns the new fraction if it increased
    pub fn update(&self, file: &str, bytes: u64) -> Option<f64> {
        let mut state = self.state.lock();
        let mark = state.per_file.entry(file.to_string()).or_default();
        if bytes <= *mark {
            return None;
        }
        *mark = bytes;
        let sent: u64 = state.per_file.values().sum();
        let fraction = if self.total == 0 {
            1.0
        } else {
            (sent as f64 / self.total as f64).min(1.0)
        };
        if fraction > state.reported {
            state.reported = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    pub fn fraction(&self) -> f64 {
        self.state.lock().reported
    }
}
