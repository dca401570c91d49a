//! `walkcap record`

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;
use walkcap_core::sensors::simulated_sources;
use walkcap_core::types::DeviceDescriptor;
use walkcap_core::{
    ArtifactBundle, CaptureConfig, CaptureEvent, EventBus, SessionContext, SessionRecorder,
    SharedEventBus, StopReason, UploadMetadata,
};

use super::upload::{enqueue_and_wait, open_queue};
use crate::args::RecordArgs;
use crate::console::CliConsole;
use crate::signals;

pub async fn execute(config: &CaptureConfig, args: RecordArgs) -> anyhow::Result<()> {
    let console = CliConsole::new();
    let context = build_context(&args);
    let events: SharedEventBus = Arc::new(EventBus::default());
    let notices = spawn_stream_notices(&events);

    let mut recorder = SessionRecorder::new(context, config.recording.clone(), events.clone());
    recorder
        .configure(simulated_sources(args.depth, config.recording.exposure_interval))
        .await
        .context("configuring sensors")?;
    recorder.start().await.context("starting recording")?;

    let spinner = console.spinner(&format!("Recording {}", recorder.context().session_id));
    let fault = recorder.fault_token();
    let (reason, signal_error) = tokio::select! {
        _ = async {
            match args.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        } => (StopReason::UserStop, None),
        signal = signals::interrupted() => signal_stop(signal),
        _ = fault.cancelled() => (StopReason::Abnormal("a stream log failed".to_string()), None),
    };
    spinner.finish_and_clear();

    let bundle = recorder.stop(reason).await.context("sealing session")?;
    notices.abort();
    print_summary(&console, &bundle);
    if let Some(e) = signal_error {
        return Err(e.context("waiting for interrupt"));
    }

    if args.upload {
        let metadata = UploadMetadata::from_context(recorder.context());
        let queue = open_queue(config, events.clone()).await?;
        enqueue_and_wait(&queue, &events, bundle, metadata, true).await?;
    }
    Ok(())
}

/// Stop reason for the signal wait; a broken handler still ends the recording, abnormally
fn signal_stop(signal: anyhow::Result<i32>) -> (StopReason, Option<anyhow::Error>) {
    match signal {
        Ok(_) => (StopReason::UserStop, None),
        Err(e) => (
            StopReason::Abnormal(format!("signal handling failed: {e}")),
            Some(e),
        ),
    }
}

fn build_context(args: &RecordArgs) -> SessionContext {
    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let device = DeviceDescriptor::new("walkcap-sim", std::env::consts::OS);
    let mut context = SessionContext::new(session_id, args.creator.clone(), device)
        .with_depth_sensor(args.depth)
        .with_source(args.source);
    if let Some(target) = &args.ids.target {
        context = context.with_target(target.clone());
    }
    if let Some(reservation) = &args.ids.reservation {
        context = context.with_reservation(reservation.clone());
    }
    if let Some(space) = &args.space_type {
        context = context.with_space_type(space.clone());
    }
    context
}

/// Print streams the recorder had to give up on
fn spawn_stream_notices(events: &SharedEventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let console = CliConsole::new();
        loop {
            match rx.recv().await {
                Ok(CaptureEvent::StreamDisabled { stream, reason, .. }) => {
                    console.warn(&format!("{stream} disabled: {reason}"))
                }
                Ok(CaptureEvent::SessionAborted { reason, .. }) => {
                    console.error(&format!("session aborted: {reason}"))
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_summary(console: &CliConsole, bundle: &ArtifactBundle) {
    let manifest = &bundle.manifest;
    console.success(&format!("Sealed session {}", bundle.session_id));
    console.field("bundle", bundle.root.display());
    console.field("duration", format!("{:.2}s", manifest.duration_s));
    console.field(
        "video",
        format!(
            "{} frames, {}x{} @ {:.1} fps",
            manifest.video_frame_count, manifest.width, manifest.height, manifest.fps_source
        ),
    );
    console.field("exposure samples", manifest.exposure_samples.len());
    console.field("depth", if manifest.has_lidar { "yes" } else { "no" });
    console.field("end reason", format!("{:?}", manifest.end_reason));
    for (stream, entry) in &manifest.streams {
        if !entry.status.is_enabled() {
            console.field(&format!("{stream}"), format!("{:?}", entry.status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::IdArgs;
    use walkcap_core::CaptureSource;

    #[test]
    fn test_signal_stop_user() {
        let (reason, error) = signal_stop(Ok(2));
        assert_eq!(reason, StopReason::UserStop);
        assert!(error.is_none());
    }

    #[test]
    fn test_signal_failure_stops_abnormally_and_keeps_error() {
        let (reason, error) = signal_stop(Err(anyhow::anyhow!("handler registration refused")));
        let StopReason::Abnormal(message) = reason else {
            panic!("expected abnormal stop");
        };
        assert!(message.contains("handler registration refused"));
        assert!(error.unwrap().to_string().contains("handler registration refused"));
    }

    #[test]
    fn test_context_from_args() {
        let args = RecordArgs {
            duration: None,
            session_id: Some("s-1".into()),
            creator: "me".into(),
            ids: IdArgs {
                target: None,
                reservation: Some("r-9".into()),
            },
            depth: true,
            source: CaptureSource::Glasses,
            space_type: Some("kitchen".into()),
            upload: false,
        };
        let context = build_context(&args);
        assert_eq!(context.session_id, "s-1");
        assert_eq!(context.reservation_id.as_deref(), Some("r-9"));
        assert!(context.has_depth_sensor);
        assert_eq!(context.capture_source, CaptureSource::Glasses);
        assert_eq!(context.intended_space_type.as_deref(), Some("kitchen"));
    }
}
