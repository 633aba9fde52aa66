//! Traits and types for resumable upload sessions

use crate::error::UploadError;
use async_trait::async_trait;
use std::path::PathBuf;

/// The local file being uploaded
#[derive(Clone, Debug)]
pub struct UploadSource {
    /// File on disk
    pub path: PathBuf,
    /// Name given to the remote object
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Bytes per round trip
    pub chunk_size: u64,
    /// Content type announced to the service, e.g. `video/x-matroska`
    pub mime_type: String,
}

/// Content type for a remote object name, `application/octet-stream` when unknown
///
/// ```
/// use transit_dl::storage::content_type_for;
///
/// assert_eq!(content_type_for("movie.mkv"), "video/x-matroska");
/// assert_eq!(content_type_for("blob"), "application/octet-stream");
/// ```
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Cumulative progress acknowledged by the service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Bytes acknowledged so far
    pub sent_bytes: u64,
    /// Declared size
    pub total_bytes: u64,
}

/// Result of one successful round trip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More data remains
    InProgress(ChunkProgress),
    /// The service has the whole file
    Done,
}

/// One resumable upload in progress
#[async_trait]
pub trait UploadSession: Send {
    /// Send the next chunk starting at the last acknowledged offset
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, UploadError>;

    /// Best-effort cancellation of the server-side session
    async fn abort(&mut self) {}
}

/// Opens resumable upload sessions
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Start a new session for `source`, authenticated with `access_token`
    async fn create_session(
        &self,
        access_token: &str,
        source: &UploadSource,
    ) -> Result<Box<dyn UploadSession>, UploadError>;
}
