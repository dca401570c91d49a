//! Frame index bookkeeping shared by the frame-correlated loggers
//!
//! Video, pose, depth and confidence all carry the producer's frame index. Each track only
//! accepts strictly increasing indices. Image tracks also record which frames actually reached
//! disk, so the frame log can reference a PNG only once it exists.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Notify;

/// Frame-indexed outputs that must stay aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameTrack {
    Video,
    Pose,
    Depth,
    SmoothedDepth,
    Confidence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrackState {
    last: Option<u64>,
    /// A logger writes this track
    active: bool,
    /// That logger has closed; nothing more will be written
    finished: bool,
    written: BTreeSet<u64>,
}

impl TrackState {
    /// `None` while the file for `index` may still appear
    fn resolution(&self, index: u64) -> Option<bool> {
        if self.written.contains(&index) {
            return Some(true);
        }
        if !self.active || self.finished || self.last.is_some_and(|last| last > index) {
            return Some(false);
        }
        None
    }
}

/// Per-track frame indices
#[derive(Debug, Default)]
pub struct FrameCounter {
    tracks: Mutex<BTreeMap<FrameTrack, TrackState>>,
    finished: Notify,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `index` if it is strictly greater than the last one on `track`
    pub fn observe(&self, track: FrameTrack, index: u64) -> bool {
        let mut tracks = self.tracks.lock();
        let state = tracks.entry(track).or_default();
        if state.last.is_some_and(|last| index <= last) {
            return false;
        }
        state.last = Some(index);
        true
    }

    pub fn last(&self, track: FrameTrack) -> Option<u64> {
        self.tracks.lock().get(&track).and_then(|s| s.last)
    }

    /// A logger for `track` is open
    pub(crate) fn activate(&self, track: FrameTrack) {
        self.tracks.lock().entry(track).or_default().active = true;
    }

    /// The file for `index` is on disk
    pub(crate) fn mark_written(&self, track: FrameTrack, index: u64) {
        self.tracks.lock().entry(track).or_default().written.insert(index);
    }

    /// The logger for `track` closed
    pub(crate) fn finish(&self, track: FrameTrack) {
        self.tracks.lock().entry(track).or_default().finished = true;
        self.finished.notify_waiters();
    }

    /// `Some(true)` once the file for `index` exists, `Some(false)` once it never will
    pub(crate) fn resolution(&self, track: FrameTrack, index: u64) -> Option<bool> {
        match self.tracks.lock().get(&track) {
            Some(state) => state.resolution(index),
            None => Some(false),
        }
    }

    /// Wait until every active track in `tracks` has finished
    pub(crate) async fn wait_finished(&self, tracks: &[FrameTrack]) {
        loop {
            let notified = self.finished.notified();
            let settled = {
                let guard = self.tracks.lock();
                tracks
                    .iter()
                    .all(|t| guard.get(t).is_none_or(|s| !s.active || s.finished))
            };
            if settled {
                return;
            }
            notified.await;
        }
    }

    /// Tracks among `tracks` whose last index differs from the first one's
    pub fn misaligned(&self, tracks: &[FrameTrack]) -> Vec<(FrameTrack, Option<u64>)> {
        let guard = self.tracks.lock();
        let last_of = |t: &FrameTrack| guard.get(t).and_then(|s| s.last);
        let Some(reference) = tracks.first().map(last_of) else {
            return Vec::new();
        };
        tracks
            .iter()
            .skip(1)
            .map(|t| (*t, last_of(t)))
            .filter(|(_, last)| *last != reference)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_observe_rejects_non_increasing() {
        let counter = FrameCounter::new();
        assert!(counter.observe(FrameTrack::Pose, 3));
        assert!(!counter.observe(FrameTrack::Pose, 3));
        assert!(!counter.observe(FrameTrack::Pose, 1));
        assert!(counter.observe(FrameTrack::Pose, 4));
        assert_eq!(counter.last(FrameTrack::Pose), Some(4));
        assert!(counter.observe(FrameTrack::Depth, 0));
    }

    #[test]
    fn test_resolution_follows_writes() {
        let counter = FrameCounter::new();
        assert_eq!(counter.resolution(FrameTrack::Depth, 0), Some(false));

        counter.activate(FrameTrack::Depth);
        assert_eq!(counter.resolution(FrameTrack::Depth, 0), None);

        counter.observe(FrameTrack::Depth, 0);
        assert_eq!(counter.resolution(FrameTrack::Depth, 0), None);
        counter.mark_written(FrameTrack::Depth, 0);
        assert_eq!(counter.resolution(FrameTrack::Depth, 0), Some(true));

        // Frame 1 was never delivered; frame 2 settles it
        counter.observe(FrameTrack::Depth, 2);
        assert_eq!(counter.resolution(FrameTrack::Depth, 1), Some(false));
        assert_eq!(counter.resolution(FrameTrack::Depth, 3), None);

        counter.finish(FrameTrack::Depth);
        assert_eq!(counter.resolution(FrameTrack::Depth, 3), Some(false));
    }

    #[tokio::test]
    async fn test_wait_finished_wakes_on_close() {
        let counter = Arc::new(FrameCounter::new());
        counter.activate(FrameTrack::Depth);
        counter.activate(FrameTrack::Confidence);
        counter.finish(FrameTrack::Confidence);

        let waiter = {
            let counter = counter.clone();
            tokio::spawn(async move {
                counter
                    .wait_finished(&[FrameTrack::Depth, FrameTrack::Confidence, FrameTrack::SmoothedDepth])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        counter.finish(FrameTrack::Depth);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_misaligned() {
        let counter = FrameCounter::new();
        counter.observe(FrameTrack::Pose, 9);
        counter.observe(FrameTrack::Depth, 9);
        counter.observe(FrameTrack::Confidence, 8);
        let report = counter.misaligned(&[FrameTrack::Pose, FrameTrack::Depth, FrameTrack::Confidence]);
        assert_eq!(report, vec![(FrameTrack::Confidence, Some(8))]);
    }
}
