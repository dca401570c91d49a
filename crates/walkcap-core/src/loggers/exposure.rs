//! Exposure telemetry; samples are also kept for the manifest

use async_trait::async_trait;
use std::path::Path;

use super::jsonl::JsonlWriter;
use super::{Appended, EXPOSURE_FILE, LoggerOptions, LoggerOutput, StreamLogger};
use crate::error::CaptureResult;
use crate::types::{ExposureSample, SensorSample, StreamKind};

pub(crate) struct ExposureLogger {
    log: JsonlWriter,
    samples: Vec<ExposureSample>,
}

impl ExposureLogger {
    pub(crate) async fn open(dir: &Path, options: LoggerOptions) -> CaptureResult<Self> {
        let log = JsonlWriter::create(
            StreamKind::Exposure,
            dir.join(EXPOSURE_FILE),
            options.sync_each_write,
        )
        .await?;
        Ok(Self {
            log,
            samples: Vec::new(),
        })
    }
}

#[async_trait]
impl StreamLogger for ExposureLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Exposure
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Exposure(e) = sample else {
            return Ok(Appended::Skipped);
        };
        self.log.append(&e).await?;
        self.samples.push(e);
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        let this = *self;
        this.log.close().await?;
        Ok(LoggerOutput::Exposure(this.samples))
    }
}
