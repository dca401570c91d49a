//! Monotonic capture clock shared by every producer of a session

use tokio::time::Instant;

/// Seconds since the session started, on tokio's clock so paused-time tests stay deterministic
#[derive(Debug, Clone, Copy)]
pub struct CaptureClock {
    origin: Instant,
}

impl CaptureClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::start()
    }
}
