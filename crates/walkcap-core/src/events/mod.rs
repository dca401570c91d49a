//! Status events flowing upstream from the pipeline
//!
//! Control flows downstream (recorder → packager → queue); the only thing that flows back is
//! status. Components publish [`CaptureEvent`]s on a broadcast [`EventBus`] and the UI (or the
//! CLI) subscribes. Publishing never blocks and is a no-op without subscribers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::session::RecorderState;
use crate::types::StreamKind;

/// Events published by the recorder and the upload queue
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    // ========== Session Events ==========
    /// Recorder moved between lifecycle states
    StateChanged {
        session_id: String,
        from: RecorderState,
        to: RecorderState,
    },

    /// An optional stream was disabled; the session continues
    StreamDisabled {
        session_id: String,
        stream: StreamKind,
        reason: String,
    },

    /// Session ended without a bundle
    SessionAborted { session_id: String, reason: String },

    /// Session bundle sealed and ready for upload
    SessionSealed {
        session_id: String,
        bundle_root: PathBuf,
    },

    // ========== Upload Events ==========
    /// Job accepted by the queue
    UploadQueued { job_id: String },

    /// Fraction of the bundle's bytes accepted by the remote store
    UploadProgress { job_id: String, progress: f64 },

    /// Transient failure, job requeued
    UploadRetrying {
        job_id: String,
        attempt: u32,
        delay: Duration,
        reason: String,
    },

    /// Every file, manifest last, accepted by the remote store
    UploadCompleted { job_id: String },

    /// Retry budget exhausted or permanent failure
    UploadFailed { job_id: String, reason: String },

    /// Job removed from retry consideration
    UploadCancelled { job_id: String },
}

/// Event bus for pipeline status distribution
///
/// # Example
///
/// ```rust
/// use walkcap_core::events::{CaptureEvent, EventBus};
///
/// #[tokio::main]
/// async fn main() {
///     let bus = EventBus::new(16);
///     let mut subscriber = bus.subscribe();
///
///     bus.publish(CaptureEvent::UploadQueued { job_id: "job-1".into() });
///
///     let event = subscriber.recv().await.unwrap();
///     assert!(matches!(event, CaptureEvent::UploadQueued { .. }));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// Slow subscribers start losing the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of receivers, 0 if nobody is listening.
    pub fn publish(&self, event: CaptureEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Thread-safe wrapper around EventBus
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new(8);
        let mut subscriber = bus.subscribe();

        let sent = bus.publish(CaptureEvent::UploadCompleted {
            job_id: "job-1".into(),
        });
        assert_eq!(sent, 1);

        let event = subscriber.recv().await.unwrap();
        assert_eq!(
            event,
            CaptureEvent::UploadCompleted {
                job_id: "job-1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(8);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.publish(CaptureEvent::UploadQueued {
            job_id: "job-2".into(),
        });

        assert!(matches!(sub1.recv().await.unwrap(), CaptureEvent::UploadQueued { .. }));
        assert!(matches!(sub2.recv().await.unwrap(), CaptureEvent::UploadQueued { .. }));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(
            bus.publish(CaptureEvent::SessionAborted {
                session_id: "s".into(),
                reason: "disk full".into(),
            }),
            0
        );
    }
}
