//! Recording session lifecycle
//!
//! [`SessionRecorder`] owns one recording from configuration to seal. Lifecycle rules live in
//! the pure [`transition`] function; the recorder only performs the side effects.

mod interrupted;
mod lease;
mod recorder;
pub(crate) mod router;
mod state;

pub use interrupted::recover_interrupted;
pub use lease::SessionLease;
pub use recorder::{SessionRecorder, StopReason};
pub use router::SampleSink;
pub use state::{RecorderEvent, RecorderState, transition};
