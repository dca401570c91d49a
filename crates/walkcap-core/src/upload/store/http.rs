//! Store that PUTs objects to an HTTP endpoint

use async_trait::async_trait;
use futures::stream;
use reqwest::{Body, Client};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{ObjectMetadata, ProgressFn, RemoteStore, UploadBody};
use crate::error::{CaptureError, CaptureResult};

const CHUNK_SIZE: usize = 256 * 1024;

/// PUTs each object to `{base_url}/{key}`
///
/// 5xx, timeouts and connection failures are transient; other non-success statuses are
/// permanent.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpStore {
    pub fn new(
        base_url: &str,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> CaptureResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CaptureError::config_with_context(
                    format!("Failed to create HTTP client: {}", e),
                    "upload.store",
                )
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn put(
        &self,
        key: &str,
        body: UploadBody,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> CaptureResult<()> {
        let length = body.len().await?;
        let body = match body {
            UploadBody::Bytes(bytes) => {
                progress(bytes.len() as u64);
                Body::from(bytes)
            }
            UploadBody::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| CaptureError::io_at(&e, &path))?;
                let chunks = stream::try_unfold((file, 0u64), move |(mut file, sent)| {
                    let progress = progress.clone();
                    async move {
                        let mut buf = vec![0u8; CHUNK_SIZE];
                        let n = file.read(&mut buf).await?;
                        if n == 0 {
                            return Ok::<_, std::io::Error>(None);
                        }
                        buf.truncate(n);
                        let sent = sent + n as u64;
                        progress(sent);
                        Ok(Some((buf, (file, sent))))
                    }
                });
                Body::wrap_stream(chunks)
            }
        };

        let mut request = self
            .client
            .put(self.url_for(key))
            .header(reqwest::header::CONTENT_LENGTH, length)
            .header("x-walkcap-job-id", &metadata.job_id)
            .header("x-walkcap-creator-id", &metadata.creator_id)
            .header("x-walkcap-capture-source", &metadata.capture_source)
            .header("x-walkcap-captured-at", &metadata.captured_at)
            .header("x-walkcap-scene-id", &metadata.scene_id);
        if let Some(target) = &metadata.target_id {
            request = request.header("x-walkcap-target-id", target);
        }
        if let Some(reservation) = &metadata.reservation_id {
            request = request.header("x-walkcap-reservation-id", reservation);
        }
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(key, status = status.as_u16(), "object upload rejected");
            return Err(CaptureError::upload_status(status.as_u16(), key, text));
        }
        debug!(key, bytes = length, "object uploaded");
        Ok(())
    }

    fn uri_for(&self, key: &str) -> String {
        self.url_for(key)
    }
}
