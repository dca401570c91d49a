//! Fan-out from producers to per-stream logger tasks
//!
//! Every enabled stream owns one unbounded channel. `push` never awaits: it checks the gate,
//! looks up the stream's sender and hands the sample over. Once the gate closes (or a stream
//! is disabled) samples are dropped and counted instead.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::sensors::CaptureClock;
use crate::types::{SensorSample, StreamKind};

pub(crate) type SampleSender = mpsc::UnboundedSender<SensorSample>;
pub(crate) type SampleReceiver = mpsc::UnboundedReceiver<SensorSample>;

#[derive(Debug, Default)]
pub(crate) struct SampleRouter {
    open: AtomicBool,
    senders: RwLock<HashMap<StreamKind, SampleSender>>,
    disabled: Mutex<BTreeMap<StreamKind, String>>,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl SampleRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create the channel for a stream; the receiver goes to its logger task
    pub(crate) fn register(&self, stream: StreamKind) -> SampleReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().insert(stream, tx);
        rx
    }

    pub(crate) fn open_gate(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Stop accepting samples and drop every sender so logger channels drain and end
    pub(crate) fn close_gate(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.senders.write().clear();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Disable a stream mid-session; its logger drains what it already received
    pub(crate) fn disable(&self, stream: StreamKind, reason: impl Into<String>) {
        let reason = reason.into();
        if self.senders.write().remove(&stream).is_some() {
            warn!(stream = %stream, reason = %reason, "stream disabled mid-session");
        }
        self.disabled.lock().entry(stream).or_insert(reason);
    }

    pub(crate) fn disabled(&self) -> BTreeMap<StreamKind, String> {
        self.disabled.lock().clone()
    }

    pub(crate) fn push(&self, sample: SensorSample) -> bool {
        if !self.is_open() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let stream = sample.stream();
        let delivered = match self.senders.read().get(&stream) {
            Some(tx) => tx.send(sample).is_ok(),
            None => false,
        };
        if delivered {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed);
            if n == 0 {
                debug!(stream = %stream, "dropping samples for inactive stream");
            }
        }
        delivered
    }

    pub(crate) fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer-side handle into a recording session
///
/// Cheap to clone; every sensor task holds one. [`SampleSink::push`] is non-blocking and returns
/// whether the sample was accepted.
#[derive(Debug, Clone)]
pub struct SampleSink {
    router: Arc<SampleRouter>,
    clock: CaptureClock,
}

impl SampleSink {
    pub(crate) fn new(router: Arc<SampleRouter>, clock: CaptureClock) -> Self {
        Self { router, clock }
    }

    pub fn push(&self, sample: SensorSample) -> bool {
        self.router.push(sample)
    }

    /// Session clock producers stamp their samples with
    pub fn clock(&self) -> CaptureClock {
        self.clock
    }

    pub fn is_open(&self) -> bool {
        self.router.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExposureSample;

    fn exposure(ts: f64) -> SensorSample {
        SensorSample::Exposure(ExposureSample {
            iso: 100.0,
            duration: 0.01,
            timestamp: ts,
        })
    }

    #[tokio::test]
    async fn test_push_before_gate_opens_is_dropped() {
        let router = SampleRouter::new();
        let _rx = router.register(StreamKind::Exposure);
        assert!(!router.push(exposure(0.0)));
        assert_eq!(router.dropped(), 1);
    }

    #[tokio::test]
    async fn test_push_routes_by_stream() {
        let router = SampleRouter::new();
        let mut rx = router.register(StreamKind::Exposure);
        router.open_gate();

        assert!(router.push(exposure(1.0)));
        assert_eq!(rx.recv().await.unwrap().timestamp(), 1.0);
        assert_eq!(router.accepted(), 1);
    }

    #[tokio::test]
    async fn test_close_gate_drains_then_ends_channel() {
        let router = SampleRouter::new();
        let mut rx = router.register(StreamKind::Exposure);
        router.open_gate();
        router.push(exposure(1.0));
        router.push(exposure(2.0));
        router.close_gate();

        assert!(!router.push(exposure(3.0)));
        assert_eq!(rx.recv().await.unwrap().timestamp(), 1.0);
        assert_eq!(rx.recv().await.unwrap().timestamp(), 2.0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_disable_records_reason() {
        let router = SampleRouter::new();
        let _rx = router.register(StreamKind::Depth);
        router.open_gate();
        router.disable(StreamKind::Depth, "intrinsics unavailable");
        router.disable(StreamKind::Depth, "second reason ignored");

        assert!(!router.push(SensorSample::Exposure(ExposureSample {
            iso: 1.0,
            duration: 1.0,
            timestamp: 0.0,
        })));
        assert_eq!(
            router.disabled().get(&StreamKind::Depth).map(String::as_str),
            Some("intrinsics unavailable")
        );
    }
}
