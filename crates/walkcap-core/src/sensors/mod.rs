//! Push-based sensor sources
//!
//! A [`SensorSource`] wraps one external producer (camera, inertial unit, pose/depth tracker)
//! or a built-in sampler. The recorder authorizes it, opens it, then runs it on its own task
//! until the session's cancellation token fires.

mod clock;
mod exposure;
mod simulated;
mod source;

pub use clock::CaptureClock;
pub use exposure::{ExposureMeter, ExposureSampler, FixedExposureMeter};
pub use simulated::{SimulatedKind, SimulatedSensor, simulated_sources};
pub use source::{Authorization, Requirement, SensorSource, SharedSensorSource};

#[cfg(test)]
pub use source::MockSensorSource;
