//! Depth and confidence maps as numbered PNG files

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Luma};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use super::frame_counter::{FrameCounter, FrameTrack};
use super::{
    Appended, CONFIDENCE_DIR, DEPTH_DIR, LoggerOptions, LoggerOutput, SMOOTHED_DEPTH_DIR,
    StreamLogger, frame_file_name,
};
use crate::error::{CaptureError, CaptureResult};
use crate::types::{SensorSample, StreamKind};

/// Pixel buffer for one PNG
enum Pixels {
    Depth(Vec<u16>),
    Confidence(Vec<u8>),
}

fn encode_png(path: &Path, width: u32, height: u32, pixels: &Pixels) -> CaptureResult<()> {
    match pixels {
        Pixels::Depth(mm) => {
            let buffer = ImageBuffer::<Luma<u16>, &[u16]>::from_raw(width, height, mm.as_slice())
                .ok_or_else(|| CaptureError::io("depth buffer does not match dimensions"))?;
            buffer.save_with_format(path, ImageFormat::Png)?;
        }
        Pixels::Confidence(levels) => {
            let buffer =
                ImageBuffer::<Luma<u8>, &[u8]>::from_raw(width, height, levels.as_slice())
                    .ok_or_else(|| CaptureError::io("confidence buffer does not match dimensions"))?;
            buffer.save_with_format(path, ImageFormat::Png)?;
        }
    }
    Ok(())
}

/// Write a PNG off the async runtime, retrying once before reporting a logger fault
async fn write_png(
    stream: StreamKind,
    path: PathBuf,
    width: u32,
    height: u32,
    pixels: Pixels,
) -> CaptureResult<()> {
    let result = tokio::task::spawn_blocking(move || {
        match encode_png(&path, width, height, &pixels) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(path = %path.display(), error = %first, "png write failed, retrying");
                encode_png(&path, width, height, &pixels)
            }
        }
    })
    .await?;
    result.map_err(|e| CaptureError::logger_write(stream.as_str(), e.to_string()))
}

fn matches_dimensions(width: u32, height: u32, len: usize) -> bool {
    width as usize * height as usize == len && len > 0
}

/// Marks image tracks active while their logger is alive and finished once it is dropped
struct TrackGuard {
    counter: Arc<FrameCounter>,
    tracks: Vec<FrameTrack>,
}

impl TrackGuard {
    fn new(counter: Arc<FrameCounter>, tracks: Vec<FrameTrack>) -> Self {
        for track in &tracks {
            counter.activate(*track);
        }
        Self { counter, tracks }
    }

    fn observe(&self, track: FrameTrack, index: u64) -> bool {
        self.counter.observe(track, index)
    }

    fn written(&self, track: FrameTrack, index: u64) {
        self.counter.mark_written(track, index);
    }
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        for track in &self.tracks {
            self.counter.finish(*track);
        }
    }
}

async fn create_dir(stream: StreamKind, dir: &Path) -> CaptureResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CaptureError::logger_open(stream.as_str(), format!("{}: {}", dir.display(), e)))
}

/// 16-bit millimeter depth, raw and (optionally) smoothed
pub(crate) struct DepthLogger {
    raw_dir: PathBuf,
    smoothed_dir: Option<PathBuf>,
    tracks: TrackGuard,
}

impl DepthLogger {
    pub(crate) async fn open(
        dir: &Path,
        options: LoggerOptions,
        counter: Arc<FrameCounter>,
    ) -> CaptureResult<Self> {
        let raw_dir = dir.join(DEPTH_DIR);
        create_dir(StreamKind::Depth, &raw_dir).await?;
        let smoothed_dir = if options.record_smoothed_depth {
            let smoothed = dir.join(SMOOTHED_DEPTH_DIR);
            create_dir(StreamKind::Depth, &smoothed).await?;
            Some(smoothed)
        } else {
            None
        };
        let mut tracks = vec![FrameTrack::Depth];
        if smoothed_dir.is_some() {
            tracks.push(FrameTrack::SmoothedDepth);
        }
        Ok(Self {
            raw_dir,
            smoothed_dir,
            tracks: TrackGuard::new(counter, tracks),
        })
    }
}

#[async_trait]
impl StreamLogger for DepthLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Depth
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Depth(depth) = sample else {
            return Ok(Appended::Skipped);
        };
        let (dir, track) = if depth.is_smoothed {
            match &self.smoothed_dir {
                Some(dir) => (dir, FrameTrack::SmoothedDepth),
                None => return Ok(Appended::Skipped),
            }
        } else {
            (&self.raw_dir, FrameTrack::Depth)
        };

        let map = &depth.map;
        if !matches_dimensions(map.width, map.height, map.meters.len()) {
            warn!(frame_index = depth.frame_index, "dropping malformed depth map");
            return Ok(Appended::Skipped);
        }
        if !self.tracks.observe(track, depth.frame_index) {
            warn!(
                frame_index = depth.frame_index,
                smoothed = depth.is_smoothed,
                "dropping depth with non-increasing frame index"
            );
            return Ok(Appended::Skipped);
        }

        let path = dir.join(frame_file_name(depth.frame_index));
        write_png(
            StreamKind::Depth,
            path,
            map.width,
            map.height,
            Pixels::Depth(map.to_millimeters()),
        )
        .await?;
        self.tracks.written(track, depth.frame_index);
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        Ok(LoggerOutput::None)
    }
}

/// 8-bit tri-level confidence (0 low, 1 medium, 2 high)
pub(crate) struct ConfidenceLogger {
    dir: PathBuf,
    tracks: TrackGuard,
}

impl ConfidenceLogger {
    pub(crate) async fn open(dir: &Path, counter: Arc<FrameCounter>) -> CaptureResult<Self> {
        let dir = dir.join(CONFIDENCE_DIR);
        create_dir(StreamKind::Confidence, &dir).await?;
        Ok(Self {
            dir,
            tracks: TrackGuard::new(counter, vec![FrameTrack::Confidence]),
        })
    }
}

#[async_trait]
impl StreamLogger for ConfidenceLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Confidence
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Confidence(conf) = sample else {
            return Ok(Appended::Skipped);
        };
        let map = conf.map;
        if !matches_dimensions(map.width, map.height, map.levels.len()) {
            warn!(frame_index = conf.frame_index, "dropping malformed confidence map");
            return Ok(Appended::Skipped);
        }
        if !self.tracks.observe(FrameTrack::Confidence, conf.frame_index) {
            warn!(
                frame_index = conf.frame_index,
                "dropping confidence with non-increasing frame index"
            );
            return Ok(Appended::Skipped);
        }

        let levels = map.levels.into_iter().map(|l| l.min(2)).collect();
        write_png(
            StreamKind::Confidence,
            self.dir.join(frame_file_name(conf.frame_index)),
            map.width,
            map.height,
            Pixels::Confidence(levels),
        )
        .await?;
        self.tracks.written(FrameTrack::Confidence, conf.frame_index);
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        Ok(LoggerOutput::None)
    }
}
