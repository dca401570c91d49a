//! Video sample buffers plus a frame index

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tracing::warn;

use super::frame_counter::{FrameCounter, FrameTrack};
use super::jsonl::{JsonlWriter, open_append, write_durably};
use super::{Appended, LoggerOptions, LoggerOutput, StreamLogger, VIDEO_FILE, VIDEO_INDEX_FILE};
use crate::error::{CaptureError, CaptureResult};
use crate::types::{SensorSample, StreamKind};

/// Line of `video_frames.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoFrameRecord {
    pub frame_index: u64,
    pub timestamp: f64,
    pub offset: u64,
    pub length: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Final shape of the video stream, reported on close
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoSummary {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
}

impl VideoSummary {
    /// Seconds between the first and last frame
    pub fn duration(&self) -> f64 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => 0.0,
        }
    }

    /// Measured frame rate, or `nominal` when fewer than two frames span a positive interval
    pub fn fps(&self, nominal: f64) -> f64 {
        let duration = self.duration();
        if self.frame_count >= 2 && duration > 0.0 {
            (self.frame_count - 1) as f64 / duration
        } else {
            nominal
        }
    }

    pub(crate) fn observe(&mut self, timestamp: f64, width: u32, height: u32) {
        self.frame_count += 1;
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(timestamp);
        if self.width == 0 {
            self.width = width;
            self.height = height;
        }
    }

    /// Rebuild from an on-disk frame index
    pub(crate) fn from_records(records: &[VideoFrameRecord]) -> Self {
        let mut summary = Self::default();
        for r in records {
            summary.observe(r.timestamp, r.width, r.height);
        }
        summary
    }
}

pub(crate) struct VideoLogger {
    path: PathBuf,
    file: File,
    index: JsonlWriter,
    offset: u64,
    sync: bool,
    counter: Arc<FrameCounter>,
    summary: VideoSummary,
}

impl VideoLogger {
    pub(crate) async fn open(
        dir: &Path,
        options: LoggerOptions,
        counter: Arc<FrameCounter>,
    ) -> CaptureResult<Self> {
        let path = dir.join(VIDEO_FILE);
        let file = open_append(&path)
            .await
            .map_err(|e| CaptureError::logger_open("video", format!("{}: {}", path.display(), e)))?;
        let index = JsonlWriter::create(
            StreamKind::Video,
            dir.join(VIDEO_INDEX_FILE),
            options.sync_each_write,
        )
        .await?;
        Ok(Self {
            path,
            file,
            index,
            offset: 0,
            sync: options.sync_each_write,
            counter,
            summary: VideoSummary::default(),
        })
    }

    async fn write_buffer(&mut self, data: &[u8]) -> CaptureResult<u64> {
        if let Err(first) = write_durably(&mut self.file, data, self.sync).await {
            warn!(path = %self.path.display(), error = %first, "video write failed, reopening");
            let mut file = open_append(&self.path)
                .await
                .map_err(|e| CaptureError::logger_write("video", format!("reopen failed: {}", e)))?;
            // Whatever part of the failed write landed stays in the file; index from its end
            let offset = file
                .metadata()
                .await
                .map_err(|e| CaptureError::logger_write("video", e.to_string()))?
                .len();
            write_durably(&mut file, data, self.sync)
                .await
                .map_err(|e| CaptureError::logger_write("video", e.to_string()))?;
            self.file = file;
            self.offset = offset;
        }
        let at = self.offset;
        self.offset += data.len() as u64;
        Ok(at)
    }
}

#[async_trait]
impl StreamLogger for VideoLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Video
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Video(frame) = sample else {
            return Ok(Appended::Skipped);
        };
        if !self.counter.observe(FrameTrack::Video, frame.frame_index) {
            warn!(
                frame_index = frame.frame_index,
                last = ?self.counter.last(FrameTrack::Video),
                "dropping video frame with non-increasing frame index"
            );
            return Ok(Appended::Skipped);
        }
        let offset = self.write_buffer(&frame.data).await?;
        let record = VideoFrameRecord {
            frame_index: frame.frame_index,
            timestamp: frame.timestamp,
            offset,
            length: frame.data.len() as u64,
            width: frame.width,
            height: frame.height,
        };
        self.index.append(&record).await?;
        self.summary.observe(frame.timestamp, frame.width, frame.height);
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        let this = *self;
        this.file
            .sync_all()
            .await
            .map_err(|e| CaptureError::logger_write("video", e.to_string()))?;
        this.index.close().await?;
        Ok(LoggerOutput::Video(this.summary))
    }
}
