//! `walkcap recover`

use std::sync::Arc;
use walkcap_core::{
    ArtifactPackager, CaptureConfig, EventBus, SharedEventBus, UploadMetadata, recover_interrupted,
};

use super::upload::open_queue;
use crate::console::{CliConsole, spawn_upload_progress};

pub async fn execute(config: &CaptureConfig, upload: bool) -> anyhow::Result<()> {
    let console = CliConsole::new();
    let packager = ArtifactPackager::from_config(&config.recording);
    let bundles = recover_interrupted(&config.recording.sessions_root, &packager).await?;
    if bundles.is_empty() {
        console.info("No interrupted sessions found");
        return Ok(());
    }
    for bundle in &bundles {
        console.success(&format!(
            "Recovered {} ({} frames, {:.1}s)",
            bundle.session_id, bundle.manifest.video_frame_count, bundle.manifest.duration_s
        ));
    }
    if !upload {
        return Ok(());
    }

    let events: SharedEventBus = Arc::new(EventBus::default());
    let progress = spawn_upload_progress(&events);
    let queue = open_queue(config, events).await?;
    for bundle in bundles {
        let metadata = UploadMetadata::from_bundle(&bundle)?;
        queue.enqueue(bundle, metadata).await?;
    }
    queue.wait_idle().await;
    progress.abort();
    Ok(())
}
