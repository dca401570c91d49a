//! Durable JSON-lines appender

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{CaptureError, CaptureResult};
use crate::types::StreamKind;

/// Append-only JSONL file with one reopen-and-retry per failed write
pub(crate) struct JsonlWriter {
    stream: StreamKind,
    path: PathBuf,
    file: File,
    sync: bool,
    lines: u64,
}

impl JsonlWriter {
    pub(crate) async fn create(stream: StreamKind, path: PathBuf, sync: bool) -> CaptureResult<Self> {
        let file = open_append(&path).await.map_err(|e| {
            CaptureError::logger_open(stream.as_str(), format!("{}: {}", path.display(), e))
        })?;
        Ok(Self {
            stream,
            path,
            file,
            sync,
            lines: 0,
        })
    }

    pub(crate) async fn append<T: Serialize + ?Sized>(&mut self, record: &T) -> CaptureResult<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| CaptureError::logger_write(self.stream.as_str(), e.to_string()))?;
        line.push(b'\n');

        if let Err(first) = write_durably(&mut self.file, &line, self.sync).await {
            warn!(
                stream = %self.stream,
                path = %self.path.display(),
                error = %first,
                "write failed, reopening log"
            );
            // A torn line from the failed write stays isolated on its own line
            let mut retry = Vec::with_capacity(line.len() + 1);
            retry.push(b'\n');
            retry.extend_from_slice(&line);

            let mut file = open_append(&self.path).await.map_err(|e| {
                CaptureError::logger_write(self.stream.as_str(), format!("reopen failed: {}", e))
            })?;
            write_durably(&mut file, &retry, self.sync)
                .await
                .map_err(|e| CaptureError::logger_write(self.stream.as_str(), e.to_string()))?;
            self.file = file;
        }

        self.lines += 1;
        Ok(())
    }

    pub(crate) async fn close(mut self) -> CaptureResult<u64> {
        self.file
            .flush()
            .await
            .map_err(|e| CaptureError::logger_write(self.stream.as_str(), e.to_string()))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| CaptureError::logger_write(self.stream.as_str(), e.to_string()))?;
        Ok(self.lines)
    }
}

pub(crate) async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

pub(crate) async fn write_durably(file: &mut File, bytes: &[u8], sync: bool) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    if sync {
        file.sync_data().await?;
    }
    Ok(())
}

/// Parse a JSONL file, skipping blank lines and lines torn by a crash
pub(crate) async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> CaptureResult<Vec<T>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CaptureError::io_at(&e, path))?;
    let mut records = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "skipping unreadable line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        n: u32,
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        let mut writer = JsonlWriter::create(StreamKind::Motion, path.clone(), true)
            .await
            .unwrap();
        writer.append(&Row { n: 1 }).await.unwrap();
        writer.append(&Row { n: 2 }).await.unwrap();
        assert_eq!(writer.close().await.unwrap(), 2);

        let rows: Vec<Row> = read_jsonl(&path).await.unwrap();
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
    }

    #[tokio::test]
    async fn test_read_skips_torn_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        tokio::fs::write(&path, "{\"n\":1}\n{\"n\":\n\n{\"n\":3}\n")
            .await
            .unwrap();
        let rows: Vec<Row> = read_jsonl(&path).await.unwrap();
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 3 }]);
    }

    #[tokio::test]
    async fn test_open_failure_is_logger_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("rows.jsonl");
        let err = JsonlWriter::create(StreamKind::Motion, path, false)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::LoggerOpenFailure { .. }));
    }
}
