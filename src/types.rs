//! Core types and events for transit-dl

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task; never reused within a process
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage of a task
///
/// Transitions only move forward:
/// `Downloading -> {DownloadFailed | AwaitingUpload -> Uploading -> {Completed | Failed}}`,
/// plus `Downloading -> Completed` when no upload was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Download engine is transferring the file
    Downloading,
    /// Download was rejected or did not finish successfully
    DownloadFailed,
    /// Downloaded, queued for the upload driver
    AwaitingUpload,
    /// Upload driver is sending chunks
    Uploading,
    /// Pipeline finished successfully
    Completed,
    /// Upload failed terminally
    Failed,
}

impl Stage {
    /// Human-readable label used in status lines
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::DownloadFailed => "download failed",
            Stage::AwaitingUpload => "waiting for upload",
            Stage::Uploading => "uploading",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::DownloadFailed | Stage::Completed | Stage::Failed)
    }

    /// Whether moving from `self` to `next` respects the forward-only ordering
    pub fn can_advance_to(&self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Downloading, Stage::DownloadFailed)
                | (Stage::Downloading, Stage::AwaitingUpload)
                | (Stage::Downloading, Stage::Completed)
                | (Stage::AwaitingUpload, Stage::Uploading)
                | (Stage::Uploading, Stage::Completed)
                | (Stage::Uploading, Stage::Failed)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Download progress as reported by the download engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Total size, if the server announced one
    pub total_bytes: Option<u64>,
    /// Instantaneous rate in bytes per second
    pub speed_bps: f64,
}

impl DownloadProgress {
    /// Completed fraction in `0.0..=1.0`, `0.0` when the total is unknown
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => (self.downloaded_bytes as f64 / total as f64).min(1.0),
            _ => 0.0,
        }
    }

    /// Estimated time remaining at the current rate
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total_bytes?;
        if self.speed_bps <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.downloaded_bytes) as f64;
        Some(Duration::from_secs_f64(remaining / self.speed_bps))
    }
}

/// Upload progress as recorded by the upload driver
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Bytes acknowledged by the storage service
    pub sent_bytes: u64,
    /// Declared file size
    pub total_bytes: u64,
    /// Throughput of the last chunk in bytes per second
    pub speed_bps: f64,
    /// Retries consumed in the current upload
    pub retries: u32,
}

impl UploadProgress {
    /// Completed fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.sent_bytes as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Policy flags fixed at submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Re-upload the file once the download succeeds (default: true)
    pub upload: bool,
    /// Remove the local file once the pipeline succeeds (default: true)
    pub delete: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            upload: true,
            delete: true,
        }
    }
}

/// Handle returned by [`PipelineManager::submit`](crate::PipelineManager::submit)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Task identifier
    pub id: TaskId,
    /// Display name given at submission
    pub name: String,
}

/// Which registry currently holds a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// Download in progress
    Download,
    /// Waiting for or undergoing upload
    Upload,
    /// Terminal failure
    Error,
    /// Terminal success history
    Completed,
}

/// Point-in-time copy of a task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identifier
    pub id: TaskId,
    /// Display name
    pub name: String,
    /// Source URL
    pub source_url: String,
    /// Local destination
    pub destination: std::path::PathBuf,
    /// Current stage
    pub stage: Stage,
    /// Registry holding the task
    pub registry: RegistryKind,
    /// Last download progress seen
    pub download: DownloadProgress,
    /// Upload progress for the current attempt, if any has been reported
    pub upload: Option<UploadProgress>,
    /// Recorded failures, oldest first
    pub errors: Vec<String>,
}

/// Three ordered sequences of formatted status lines
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// One line per task in the download registry
    pub downloads: Vec<String>,
    /// One line per task in the upload registry
    pub uploads: Vec<String>,
    /// One block per task in the error registry
    pub errors: Vec<String>,
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task accepted and download started
    Submitted {
        /// Task ID
        id: TaskId,
        /// Display name
        name: String,
    },

    /// Download engine refused the task; it went straight to the error registry
    SubmissionRejected {
        /// Task ID
        id: TaskId,
        /// Rejection reason
        error: String,
    },

    /// Download finished successfully
    DownloadFinished {
        /// Task ID
        id: TaskId,
        /// Whether the task was queued for upload
        queued_for_upload: bool,
    },

    /// Download did not complete
    DownloadFailed {
        /// Task ID
        id: TaskId,
        /// Failure reason
        error: String,
    },

    /// Upload driver opened the first session for a task
    UploadStarted {
        /// Task ID
        id: TaskId,
    },

    /// A chunk was acknowledged
    UploadProgress {
        /// Task ID
        id: TaskId,
        /// Bytes acknowledged so far
        sent_bytes: u64,
        /// Declared size
        total_bytes: u64,
    },

    /// A retryable upload failure consumed one retry
    UploadRetrying {
        /// Task ID
        id: TaskId,
        /// Retry number (1-based)
        attempt: u32,
        /// Retry bound
        max: u32,
        /// Whether a new session is opened for this retry
        new_session: bool,
    },

    /// Task reached its success end
    Completed {
        /// Task ID
        id: TaskId,
    },

    /// Upload failed terminally
    Failed {
        /// Task ID
        id: TaskId,
        /// Failure reason
        error: String,
    },

    /// Credential obtained and stored
    Authorized,

    /// Pipeline is shutting down
    Shutdown,
}
