//! Storage service boundary
//!
//! The upload driver opens an [`UploadSession`] through a [`StorageClient`] and
//! pulls it forward one chunk at a time. Failures come back as
//! [`UploadError`](crate::error::UploadError) values and the driver classifies them
//! with [`Classify`](crate::retry::Classify).
//!
//! - [`DriveClient`]: Google Drive v3 resumable uploads

mod drive;
mod traits;

pub use drive::DriveClient;
pub use traits::{
    ChunkOutcome, ChunkProgress, StorageClient, UploadSession, UploadSource, content_type_for,
};
