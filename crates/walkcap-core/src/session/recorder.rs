//! Session recorder
//!
//! One `SessionRecorder` per recording. It authorizes the sensor sources, creates and leases the
//! session directory, runs one logger task per enabled stream and one producer task per source,
//! and on stop drives the barrier that makes the on-disk artifacts final before packaging.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::lease::SessionLease;
use super::router::{SampleRouter, SampleSink};
use super::state::{RecorderEvent, RecorderState, transition};
use crate::config::RecordingConfig;
use crate::error::{CaptureError, CaptureResult, OptionExt};
use crate::events::{CaptureEvent, SharedEventBus};
use crate::loggers::{
    FrameCounter, FrameTrack, LoggerHandle, LoggerOptions, LoggerOutput, LoggerSummary,
    StreamLogger, StreamStatus, VideoSummary, open_logger,
};
use crate::packaging::{
    ArtifactBundle, ArtifactPackager, CollectedSession, EndReason, SESSION_FILE, StreamReport,
    count_mesh_files,
};
use crate::sensors::{Authorization, CaptureClock, Requirement, SharedSensorSource};
use crate::types::{SessionContext, StreamKind};

/// Why a recording stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    UserStop,
    /// Logger fault, crash signal or lost required sensor
    Abnormal(String),
}

impl StopReason {
    fn end_reason(&self) -> EndReason {
        match self {
            Self::UserStop => EndReason::UserStop,
            Self::Abnormal(_) => EndReason::Abnormal,
        }
    }
}

struct ActiveSession {
    dir: PathBuf,
    lease: SessionLease,
    router: Arc<SampleRouter>,
    sink: SampleSink,
    counter: Arc<FrameCounter>,
    /// Close order: video first
    loggers: Vec<LoggerHandle>,
    producers: Vec<JoinHandle<()>>,
    producer_cancel: CancellationToken,
}

pub struct SessionRecorder {
    context: SessionContext,
    config: RecordingConfig,
    packager: ArtifactPackager,
    events: SharedEventBus,
    state: RecorderState,
    sources: Vec<SharedSensorSource>,
    disabled: BTreeMap<StreamKind, String>,
    fault: CancellationToken,
    active: Option<ActiveSession>,
}

impl SessionRecorder {
    pub fn new(context: SessionContext, config: RecordingConfig, events: SharedEventBus) -> Self {
        let packager = ArtifactPackager::from_config(&config);
        Self {
            context,
            config,
            packager,
            events,
            state: RecorderState::Idle,
            sources: Vec::new(),
            disabled: BTreeMap::new(),
            fault: CancellationToken::new(),
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn session_dir(&self) -> PathBuf {
        self.config.sessions_root.join(&self.context.session_id)
    }

    /// Producer handle for push-based collaborators; `None` unless recording
    pub fn sink(&self) -> Option<SampleSink> {
        self.active.as_ref().map(|a| a.sink.clone())
    }

    /// Cancelled when a logger faults; the owner should then call `stop` with an abnormal reason
    pub fn fault_token(&self) -> CancellationToken {
        self.fault.clone()
    }

    /// Streams disabled so far, with reasons
    pub fn disabled_streams(&self) -> &BTreeMap<StreamKind, String> {
        &self.disabled
    }

    fn apply(&mut self, event: RecorderEvent) -> CaptureResult<()> {
        let next = transition(self.state, event)?;
        debug!(from = %self.state, to = %next, ?event, "recorder transition");
        self.events.publish(CaptureEvent::StateChanged {
            session_id: self.context.session_id.clone(),
            from: self.state,
            to: next,
        });
        self.state = next;
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        if self.apply(RecorderEvent::Abort).is_ok() {
            warn!(session_id = %self.context.session_id, reason, "session aborted");
            self.events.publish(CaptureEvent::SessionAborted {
                session_id: self.context.session_id.clone(),
                reason: reason.to_string(),
            });
        }
    }

    /// First reason wins
    fn disable(&mut self, stream: StreamKind, reason: impl Into<String>) {
        if self.disabled.contains_key(&stream) {
            return;
        }
        let reason = reason.into();
        info!(stream = %stream, reason = %reason, "stream disabled");
        self.events.publish(CaptureEvent::StreamDisabled {
            session_id: self.context.session_id.clone(),
            stream,
            reason: reason.clone(),
        });
        self.disabled.insert(stream, reason);
    }

    /// Authorize sources; every missing required capability is reported at once
    #[instrument(skip(self, sources), fields(session_id = %self.context.session_id))]
    pub async fn configure(&mut self, sources: Vec<SharedSensorSource>) -> CaptureResult<()> {
        transition(self.state, RecorderEvent::Configure)?;

        let mut missing = Vec::new();
        let mut denied_optional = Vec::new();
        for source in &sources {
            if let Authorization::Denied { capability } = source.authorize().await {
                match source.requirement() {
                    Requirement::Required => missing.push(capability),
                    Requirement::Optional => denied_optional.push((source.streams(), capability)),
                }
            }
        }
        if !missing.is_empty() {
            warn!(?missing, "required sensors not authorized");
            return Err(CaptureError::permission_denied(missing));
        }

        for stream in StreamKind::ALL.iter().filter(|s| s.is_required()) {
            if !sources.iter().any(|s| s.streams().contains(stream)) {
                return Err(CaptureError::config(format!(
                    "no sensor source for required stream {}",
                    stream
                )));
            }
        }

        for (streams, capability) in denied_optional {
            for stream in streams {
                self.disable(stream, format!("{} not authorized", capability));
            }
        }
        if !self.context.has_depth_sensor {
            for stream in StreamKind::ALL.iter().filter(|s| s.requires_depth_sensor()) {
                self.disable(*stream, "device has no depth sensor");
            }
        }
        for stream in StreamKind::ALL {
            if !sources.iter().any(|s| s.streams().contains(&stream)) {
                self.disable(stream, "no sensor source");
            }
        }

        self.sources = sources;
        self.apply(RecorderEvent::Configure)
    }

    /// Create the session directory, open loggers and subscribe sources
    ///
    /// A required logger or source that fails to open aborts the session.
    #[instrument(skip(self), fields(session_id = %self.context.session_id))]
    pub async fn start(&mut self) -> CaptureResult<()> {
        transition(self.state, RecorderEvent::Start)?;
        match self.open_session().await {
            Ok(active) => {
                self.active = Some(active);
                self.apply(RecorderEvent::Start)?;
                info!(dir = %self.session_dir().display(), "recording started");
                Ok(())
            }
            Err(e) => {
                self.abort(&e.to_string());
                Err(e)
            }
        }
    }

    async fn open_session(&mut self) -> CaptureResult<ActiveSession> {
        let dir = self.session_dir();
        tokio::fs::create_dir_all(&self.config.sessions_root)
            .await
            .map_err(|e| CaptureError::logger_open("session", e.to_string()))?;
        tokio::fs::create_dir(&dir).await.map_err(|e| {
            CaptureError::logger_open("session", format!("{}: {}", dir.display(), e))
        })?;

        let lease = SessionLease::acquire(&dir, &self.context.session_id)?;
        match self.open_streams(&dir).await {
            Ok((router, counter, loggers, sources)) => {
                let clock = CaptureClock::start();
                let sink = SampleSink::new(router.clone(), clock);
                let producer_cancel = CancellationToken::new();
                router.open_gate();

                let producers = sources
                    .into_iter()
                    .map(|source| {
                        let sink = sink.clone();
                        let cancel = producer_cancel.clone();
                        tokio::spawn(async move { source.run(sink, cancel).await })
                    })
                    .collect();

                Ok(ActiveSession {
                    dir,
                    lease,
                    router,
                    sink,
                    counter,
                    loggers,
                    producers,
                    producer_cancel,
                })
            }
            Err(e) => {
                if let Err(release) = lease.release() {
                    warn!(error = %release, "failed to release lease after aborted start");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    async fn open_streams(
        &mut self,
        dir: &Path,
    ) -> CaptureResult<(
        Arc<SampleRouter>,
        Arc<FrameCounter>,
        Vec<LoggerHandle>,
        Vec<SharedSensorSource>,
    )> {
        let session_json = serde_json::to_vec_pretty(&self.context)?;
        tokio::fs::write(dir.join(SESSION_FILE), session_json)
            .await
            .map_err(|e| CaptureError::logger_open("session", e.to_string()))?;

        // Bring devices up before any log exists
        let mut running = Vec::new();
        for source in self.sources.clone() {
            let streams: Vec<_> = source
                .streams()
                .into_iter()
                .filter(|s| !self.disabled.contains_key(s))
                .collect();
            if streams.is_empty() {
                continue;
            }
            match source.open().await {
                Ok(()) => running.push(source),
                Err(e) if source.requirement() == Requirement::Required => {
                    return Err(CaptureError::logger_open(source.label(), e.to_string()));
                }
                Err(e) => {
                    for stream in streams {
                        self.disable(stream, format!("{} unavailable: {}", source.label(), e));
                    }
                }
            }
        }

        let router = Arc::new(SampleRouter::new());
        let counter = Arc::new(FrameCounter::new());
        let mut opened: Vec<Box<dyn StreamLogger>> = Vec::new();
        for stream in StreamKind::ALL {
            if self.disabled.contains_key(&stream) {
                continue;
            }
            let options = LoggerOptions {
                sync_each_write: self.config.sync_each_write,
                record_smoothed_depth: self.config.record_smoothed_depth,
            };
            match open_logger(stream, dir, options, counter.clone(), router.clone()).await {
                Ok(logger) => opened.push(logger),
                Err(e) if stream.is_required() => return Err(e),
                Err(e) => self.disable(stream, format!("log could not be opened: {}", e)),
            }
        }

        let loggers = opened
            .into_iter()
            .map(|logger| {
                let rx = router.register(logger.stream());
                LoggerHandle::spawn(logger, rx, self.fault.clone())
            })
            .collect();

        Ok((router, counter, loggers, running))
    }

    /// Unsubscribe, drain and close every logger, then seal the bundle
    #[instrument(skip(self), fields(session_id = %self.context.session_id))]
    pub async fn stop(&mut self, reason: StopReason) -> CaptureResult<ArtifactBundle> {
        transition(self.state, RecorderEvent::Stop)?;
        let active = self.active.take().context("no active recording")?;
        self.apply(RecorderEvent::Stop)?;
        info!(?reason, "stopping recording");

        // Producers are gone before the gate closes; anything they pushed is already queued
        active.producer_cancel.cancel();
        for producer in active.producers {
            if let Err(e) = producer.await {
                warn!(error = %e, "sensor task ended abnormally");
            }
        }
        active.router.close_gate();

        let mut summaries = Vec::with_capacity(active.loggers.len());
        for handle in active.loggers {
            let stream = handle.stream();
            let summary = handle.finish().await.unwrap_or_else(|e| LoggerSummary {
                stream,
                records: 0,
                skipped: 0,
                fault: Some(e.to_string()),
                output: LoggerOutput::None,
            });
            summaries.push(summary);
        }

        let misaligned = active.counter.misaligned(&[
            FrameTrack::Pose,
            FrameTrack::Video,
            FrameTrack::Depth,
            FrameTrack::Confidence,
        ]);
        if !misaligned.is_empty() && self.context.has_depth_sensor {
            warn!(
                pose_last = ?active.counter.last(FrameTrack::Pose),
                ?misaligned,
                "frame-indexed streams end at different frames"
            );
        }
        info!(
            accepted = active.router.accepted(),
            dropped = active.router.dropped(),
            "sample routing finished"
        );

        for (stream, reason) in active.router.disabled() {
            self.disable(stream, reason);
        }
        let collected = self.collect(&active.dir, summaries, &reason);

        match self
            .packager
            .finalize(&active.dir, &self.context, &collected)
            .await
        {
            Ok(bundle) => {
                if let Err(e) = active.lease.release() {
                    warn!(error = %e, "failed to release session lease");
                }
                self.apply(RecorderEvent::Seal)?;
                self.events.publish(CaptureEvent::SessionSealed {
                    session_id: self.context.session_id.clone(),
                    bundle_root: bundle.root.clone(),
                });
                Ok(bundle)
            }
            Err(e) => {
                if let Err(release) = active.lease.release() {
                    warn!(error = %release, "failed to release session lease");
                }
                self.abort(&e.to_string());
                Err(e)
            }
        }
    }

    fn collect(
        &self,
        dir: &Path,
        summaries: Vec<LoggerSummary>,
        reason: &StopReason,
    ) -> CollectedSession {
        let mut streams = BTreeMap::new();
        let mut video = VideoSummary::default();
        let mut exposure = Vec::new();
        let mut faulted = false;

        for stream in StreamKind::ALL {
            if let Some(reason) = self.disabled.get(&stream) {
                let records = summaries
                    .iter()
                    .find(|s| s.stream == stream)
                    .map_or(0, |s| s.records);
                streams.insert(
                    stream,
                    StreamReport {
                        status: StreamStatus::Disabled {
                            reason: reason.clone(),
                        },
                        records,
                    },
                );
            }
        }

        for summary in summaries {
            match summary.output {
                LoggerOutput::Video(v) => video = v,
                LoggerOutput::Exposure(samples) => exposure = samples,
                LoggerOutput::None => {}
            }
            if streams.contains_key(&summary.stream) {
                continue;
            }
            let status = match summary.fault {
                Some(reason) => {
                    faulted = true;
                    StreamStatus::Faulted { reason }
                }
                None => StreamStatus::Enabled,
            };
            streams.insert(
                summary.stream,
                StreamReport {
                    status,
                    records: summary.records,
                },
            );
        }

        let end_reason = if faulted {
            EndReason::Abnormal
        } else {
            reason.end_reason()
        };
        let mesh_files = if streams
            .get(&StreamKind::Mesh)
            .is_some_and(|r| r.status.is_enabled())
        {
            count_mesh_files(dir)
        } else {
            0
        };

        CollectedSession {
            streams,
            video,
            exposure,
            mesh_files,
            end_reason,
        }
    }
}
