//! Error types for transit-dl
//!
//! Task-scoped failures (a download that never started, a download that broke
//! midway, an upload that gave up) are recorded on the task and routed to the
//! error registry. Only authorization problems and call misuse surface as
//! [`Error`] values returned to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for transit-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for transit-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upload.chunk_size_mb")
        key: Option<String>,
    },

    /// A public call was made with arguments that can never succeed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The download engine refused to start a transfer
    #[error("submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    /// Upload failure
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Authorization / credential store failure
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,
}

/// The download engine rejected a request before any transfer began
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// URL could not be parsed at all
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The URL as submitted
        url: String,
        /// Parser message
        reason: String,
    },

    /// URL parsed but uses a scheme the engine cannot fetch
    #[error("unsupported scheme '{scheme}' in {url}")]
    UnsupportedScheme {
        /// The URL as submitted
        url: String,
        /// Offending scheme
        scheme: String,
    },

    /// URL has no usable host
    #[error("invalid host in {url}")]
    InvalidHost {
        /// The URL as submitted
        url: String,
    },

    /// Destination could not be prepared
    #[error("cannot prepare destination {path}: {reason}")]
    Destination {
        /// Destination path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },
}

/// Upload failures, classified by [`crate::retry::Classify`]
#[derive(Debug, Error)]
pub enum UploadError {
    /// The resumable session is gone (HTTP 404); a fresh session is required
    #[error("upload session expired (HTTP {status}): {message}")]
    SessionExpired {
        /// HTTP status returned by the storage service
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Server-side hiccup (500/502/503/504, or a 308 that acknowledged nothing new);
    /// the same session may be resumed
    #[error("transient server error (HTTP {status}): {message}")]
    TransientServer {
        /// HTTP status returned by the storage service
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Any other HTTP rejection (401, 403, 400, ...)
    #[error("upload rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status returned by the storage service
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Transport-level failure talking to the storage service
    #[error("network error during upload: {message}")]
    Network {
        /// Error text
        message: String,
        /// Timeouts and refused/reset connections can be resumed
        retryable: bool,
    },

    /// Storage service answered with something that breaks the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reading the local file failed
    #[error("I/O error during upload: {0}")]
    Io(#[from] std::io::Error),

    /// No usable credential was available when opening a session
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Retry counter ran out while the failure was still retryable
    #[error("gave up after {attempts} retries: {last}")]
    RetriesExhausted {
        /// Number of retries consumed
        attempts: u32,
        /// The failure that could not be retried any more
        last: Box<UploadError>,
    },

    /// The upload was stopped by shutdown
    #[error("upload aborted by shutdown")]
    Aborted,
}

impl UploadError {
    /// Map an HTTP status from the storage service to an upload failure
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => UploadError::SessionExpired { status, message },
            500 | 502 | 503 | 504 => UploadError::TransientServer { status, message },
            _ => UploadError::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Network {
            retryable: e.is_timeout() || e.is_connect(),
            message: e.to_string(),
        }
    }
}

/// Credential store and authorization flow errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization code was rejected by the token endpoint
    #[error("invalid authorization code: {0}")]
    InvalidCode(String),

    /// `exchange_code` was called before `authorization_url`
    #[error("authorization flow not started")]
    FlowNotStarted,

    /// A valid credential is already present
    #[error("already authorized")]
    AlreadyAuthorized,

    /// No credential present
    #[error("not authorized")]
    NotAuthorized,

    /// Refreshing an expired access token failed
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Client secrets file is missing or malformed
    #[error("client secrets {path}: {reason}")]
    Secrets {
        /// Secrets file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Persisting or loading the credential failed
    #[error("credential store {path}: {reason}")]
    Store {
        /// Credential file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Token endpoint could not be reached
    #[error("token endpoint unreachable: {0}")]
    Network(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}
