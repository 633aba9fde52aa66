//! Single-connection HTTP(S) download engine

use super::traits::{
    CompletionSignal, DownloadEngine, DownloadOutcome, DownloadRequest, DownloadTransfer,
};
use crate::error::SubmissionError;
use crate::types::DownloadProgress;
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Sentinel for "server did not announce a length"
const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Minimum window over which the instantaneous rate is measured
const RATE_WINDOW: Duration = Duration::from_millis(250);

/// Streams a URL to disk with `reqwest`
#[derive(Clone)]
pub struct HttpDownloadEngine {
    client: reqwest::Client,
}

impl HttpDownloadEngine {
    /// Build an engine whose requests carry `user_agent`
    pub fn new(user_agent: &str) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl DownloadEngine for HttpDownloadEngine {
    fn start(
        &self,
        request: DownloadRequest,
        signal: CompletionSignal,
    ) -> Result<Arc<dyn DownloadTransfer>, SubmissionError> {
        let url = validate_url(&request.url)?;
        prepare_destination(&request.destination)?;
        let state = Arc::new(TransferState::new());

        let client = self.client.clone();
        let worker = Arc::clone(&state);
        tokio::spawn(async move {
            let outcome = match fetch(&client, url, &request.destination, &worker).await {
                Ok(()) => {
                    tracing::info!(task_id = %request.id, "Download finished");
                    DownloadOutcome::Succeeded
                }
                Err(reason) => {
                    tracing::warn!(task_id = %request.id, error = %reason, "Download failed");
                    DownloadOutcome::Failed(reason)
                }
            };
            worker.speed_bits.store(0f64.to_bits(), Ordering::Relaxed);
            let _ = worker.outcome.set(outcome);
            signal.notify();
        });

        Ok(Arc::new(HttpTransfer { state }))
    }
}

/// Check a submitted URL before any network activity
///
/// Accepts absolute `http`/`https` URLs with a non-empty host. Engines call this
/// from [`DownloadEngine::start`] to reject requests synchronously.
pub fn validate_url(raw: &str) -> Result<Url, SubmissionError> {
    let url = Url::parse(raw).map_err(|e| match e {
        url::ParseError::EmptyHost
        | url::ParseError::IdnaError
        | url::ParseError::InvalidDomainCharacter
        | url::ParseError::InvalidIpv4Address
        | url::ParseError::InvalidIpv6Address => SubmissionError::InvalidHost {
            url: raw.to_string(),
        },
        other => SubmissionError::InvalidUrl {
            url: raw.to_string(),
            reason: other.to_string(),
        },
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubmissionError::UnsupportedScheme {
            url: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SubmissionError::InvalidHost {
            url: raw.to_string(),
        });
    }
    Ok(url)
}

struct TransferState {
    downloaded: AtomicU64,
    total: AtomicU64,
    speed_bits: AtomicU64,
    outcome: OnceLock<DownloadOutcome>,
    cancel: CancellationToken,
}

impl TransferState {
    fn new() -> Self {
        Self {
            downloaded: AtomicU64::new(0),
            total: AtomicU64::new(UNKNOWN_TOTAL),
            speed_bits: AtomicU64::new(0f64.to_bits()),
            outcome: OnceLock::new(),
            cancel: CancellationToken::new(),
        }
    }
}

struct HttpTransfer {
    state: Arc<TransferState>,
}

impl DownloadTransfer for HttpTransfer {
    fn progress(&self) -> DownloadProgress {
        let total = self.state.total.load(Ordering::Relaxed);
        DownloadProgress {
            downloaded_bytes: self.state.downloaded.load(Ordering::Relaxed),
            total_bytes: (total != UNKNOWN_TOTAL).then_some(total),
            speed_bps: f64::from_bits(self.state.speed_bits.load(Ordering::Relaxed)),
        }
    }

    fn outcome(&self) -> Option<DownloadOutcome> {
        self.state.outcome.get().cloned()
    }

    fn cancel(&self) {
        self.state.cancel.cancel();
    }
}

/// Create the destination's directory so a bad path fails the submission
fn prepare_destination(destination: &Path) -> Result<(), SubmissionError> {
    let Some(parent) = destination.parent() else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|e| SubmissionError::Destination {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })
}

async fn fetch(
    client: &reqwest::Client,
    url: Url,
    destination: &Path,
    state: &TransferState,
) -> Result<(), String> {
    let response = tokio::select! {
        _ = state.cancel.cancelled() => return Err("download cancelled".to_string()),
        response = client.get(url).send() => response.map_err(|e| e.to_string())?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(format!("server answered HTTP {}", status));
    }
    let expected = response.content_length();
    if let Some(len) = expected {
        state.total.store(len, Ordering::Relaxed);
    }

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| format!("cannot create {}: {}", destination.display(), e))?;
    let mut stream = response.bytes_stream();
    let mut window_start = Instant::now();
    let mut window_bytes = 0u64;

    loop {
        let next = tokio::select! {
            _ = state.cancel.cancelled() => return Err("download cancelled".to_string()),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| e.to_string())?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write to {} failed: {}", destination.display(), e))?;

        let len = chunk.len() as u64;
        state.downloaded.fetch_add(len, Ordering::Relaxed);
        window_bytes += len;
        let elapsed = window_start.elapsed();
        if elapsed >= RATE_WINDOW {
            let rate = window_bytes as f64 / elapsed.as_secs_f64();
            state.speed_bits.store(rate.to_bits(), Ordering::Relaxed);
            window_start = Instant::now();
            window_bytes = 0;
        }
    }

    file.flush()
        .await
        .map_err(|e| format!("flush of {} failed: {}", destination.display(), e))?;

    let written = state.downloaded.load(Ordering::Relaxed);
    if let Some(expected) = expected {
        if written < expected {
            return Err(format!(
                "connection closed after {} of {} bytes",
                written, expected
            ));
        }
    }
    Ok(())
}
