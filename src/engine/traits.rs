//! Traits and types shared by download engine implementations

use crate::error::SubmissionError;
use crate::types::{DownloadProgress, TaskId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// What to fetch and where to put it
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Task the transfer belongs to
    pub id: TaskId,
    /// Source URL as submitted
    pub url: String,
    /// Local destination file
    pub destination: PathBuf,
}

/// Final result of a transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File fully written to its destination
    Succeeded,
    /// Transfer stopped early; the string is the engine's reason
    Failed(String),
}

/// Wakes the download supervisor when any transfer finishes
///
/// Backed by [`Notify::notify_one`], so a completion that fires while the
/// supervisor is busy is remembered for its next wait.
#[derive(Clone, Debug, Default)]
pub struct CompletionSignal {
    notify: Arc<Notify>,
}

impl CompletionSignal {
    /// Create a signal with no pending notification
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that a transfer reached its outcome
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next completion report
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// A transfer in flight, owned by the download registry
pub trait DownloadTransfer: Send + Sync {
    /// Latest progress numbers
    fn progress(&self) -> DownloadProgress;

    /// Non-blocking completion check; `None` while still running
    fn outcome(&self) -> Option<DownloadOutcome>;

    /// Best-effort abort used during shutdown
    fn cancel(&self);
}

/// Starts transfers on behalf of the pipeline
///
/// # Examples
///
/// ```no_run
/// use transit_dl::engine::{CompletionSignal, DownloadEngine, DownloadRequest, HttpDownloadEngine};
/// use transit_dl::types::TaskId;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = HttpDownloadEngine::new("transit-dl")?;
/// let signal = CompletionSignal::new();
/// let transfer = engine.start(
///     DownloadRequest {
///         id: TaskId::next(),
///         url: "https://example.com/file.iso".to_string(),
///         destination: "/tmp/file.iso".into(),
///     },
///     signal.clone(),
/// )?;
/// signal.notified().await;
/// println!("{:?}", transfer.outcome());
/// # Ok(())
/// # }
/// ```
pub trait DownloadEngine: Send + Sync {
    /// Begin a transfer in the background.
    ///
    /// Requests that can never succeed (malformed URL, unsupported scheme,
    /// missing host) are rejected here, before anything is spawned.
    /// Must be called from within a Tokio runtime.
    fn start(
        &self,
        request: DownloadRequest,
        signal: CompletionSignal,
    ) -> Result<Arc<dyn DownloadTransfer>, SubmissionError>;
}
