//! Google Drive v3 resumable upload client

use super::traits::{ChunkOutcome, ChunkProgress, StorageClient, UploadSession, UploadSource};
use crate::error::UploadError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// HTTP status Drive uses for "chunk accepted, keep going"
const RESUME_INCOMPLETE: u16 = 308;

/// Opens resumable sessions against a Drive-compatible upload endpoint
#[derive(Clone)]
pub struct DriveClient {
    client: reqwest::Client,
    endpoint: String,
    folder_id: Option<String>,
}

impl DriveClient {
    /// Build a client for `endpoint`, optionally placing files under `folder_id`
    pub fn new(
        endpoint: impl Into<String>,
        folder_id: Option<String>,
        user_agent: &str,
    ) -> crate::Result<Self> {
        // 308 is a progress report here, never a redirect
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            folder_id,
        })
    }
}

#[async_trait]
impl StorageClient for DriveClient {
    async fn create_session(
        &self,
        access_token: &str,
        source: &UploadSource,
    ) -> Result<Box<dyn UploadSession>, UploadError> {
        let mut metadata = serde_json::json!({ "name": source.name });
        if let Some(folder) = &self.folder_id {
            metadata["parents"] = serde_json::json!([folder]);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("uploadType", "resumable")])
            .bearer_auth(access_token)
            .header("X-Upload-Content-Length", source.size)
            .header("X-Upload-Content-Type", source.mime_type.as_str())
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(metadata.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::from_status(status.as_u16(), body));
        }

        let session_uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::Protocol("session response carried no Location header".to_string())
            })?;

        tracing::debug!(name = %source.name, size = source.size, mime_type = %source.mime_type, "Opened resumable upload session");

        Ok(Box::new(DriveSession {
            client: self.client.clone(),
            session_uri,
            access_token: access_token.to_string(),
            path: source.path.clone(),
            size: source.size,
            chunk_size: source.chunk_size.max(1),
            offset: 0,
        }))
    }
}

struct DriveSession {
    client: reqwest::Client,
    session_uri: String,
    access_token: String,
    path: PathBuf,
    size: u64,
    chunk_size: u64,
    offset: u64,
}

#[async_trait]
impl UploadSession for DriveSession {
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, UploadError> {
        let start = self.offset;
        let len = self.chunk_size.min(self.size.saturating_sub(start));
        let body = read_range(&self.path, start, len).await?;
        let content_range = if self.size == 0 {
            "bytes */0".to_string()
        } else {
            format!("bytes {}-{}/{}", start, start + len - 1, self.size)
        };

        let response = self
            .client
            .put(&self.session_uri)
            .bearer_auth(&self.access_token)
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => {
                self.offset = self.size;
                Ok(ChunkOutcome::Done)
            }
            RESUME_INCOMPLETE => {
                let acknowledged = acknowledged_bytes(response.headers())?;
                self.offset = acknowledged;
                Ok(ChunkOutcome::InProgress(ChunkProgress {
                    sent_bytes: acknowledged,
                    total_bytes: self.size,
                }))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(UploadError::from_status(status, body))
            }
        }
    }

    async fn abort(&mut self) {
        if let Err(e) = self
            .client
            .delete(&self.session_uri)
            .bearer_auth(&self.access_token)
            .send()
            .await
        {
            tracing::debug!(error = %e, "Failed to cancel resumable session");
        }
    }
}

/// Parse the `Range: bytes=0-N` header of a 308 response into a byte count
fn acknowledged_bytes(headers: &reqwest::header::HeaderMap) -> Result<u64, UploadError> {
    let Some(value) = headers.get(RANGE) else {
        return Ok(0);
    };
    let text = value
        .to_str()
        .map_err(|_| UploadError::Protocol("non-ASCII Range header".to_string()))?;
    text.strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .ok_or_else(|| UploadError::Protocol(format!("unparseable Range header: {}", text)))
}

async fn read_range(path: &Path, start: u64, len: u64) -> Result<Vec<u8>, UploadError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let mut buf = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut buf).await?;
    if buf.len() as u64 != len {
        return Err(UploadError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} shrank while uploading", path.display()),
        )));
    }
    Ok(buf)
}
