//! # transit-dl
//!
//! Background pipeline that downloads URLs to local disk and re-uploads the
//! files to cloud storage through a resumable upload protocol.
//!
//! ## How a task moves
//!
//! - [`PipelineManager::submit`] hands the URL to the download engine; the task
//!   sits in the download registry while the transfer runs
//! - the download supervisor moves finished transfers to the upload registry
//!   (or straight to the end when no upload was requested)
//! - the upload driver serves the upload registry one task at a time, retrying
//!   expired sessions and transient server errors within a bounded budget
//! - failures land in the error registry with every reason recorded
//!
//! Uploads wait until a credential is present; see
//! [`PipelineManager::authorization_url`] and [`PipelineManager::exchange_code`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use transit_dl::{Config, PipelineManager, SubmitOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = PipelineManager::from_config(Config::default()).await?;
//!     manager.start().await;
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     manager
//!         .submit(
//!             "https://example.com/big.iso",
//!             "big.iso",
//!             SubmitOptions::default(),
//!         )
//!         .await?;
//!
//!     for line in manager.status().await.downloads {
//!         println!("{line}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Credential store and authorization flow
pub mod auth;
/// Configuration types
pub mod config;
/// Download engine seam and the HTTP implementation
pub mod engine;
/// Error types
pub mod error;
/// Pipeline manager (decomposed into focused submodules)
pub mod pipeline;
/// Upload failure classification and retry budget
pub mod retry;
/// Resumable upload seam and the Google Drive client
pub mod storage;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use auth::{Authorizer, ClientSecrets, Credential, CredentialStore, OAuthClient, TokenEndpoint};
pub use config::Config;
pub use engine::{DownloadEngine, HttpDownloadEngine};
pub use error::{AuthError, Error, Result, SubmissionError, UploadError};
pub use pipeline::PipelineManager;
pub use storage::{DriveClient, StorageClient};
pub use types::{
    DownloadProgress, Event, RegistryKind, Stage, StatusReport, SubmitOptions, TaskHandle, TaskId,
    TaskSnapshot, UploadProgress,
};

/// Wait for SIGTERM or SIGINT (Ctrl+C off Unix), then shut the pipeline down.
///
/// Nothing happens to the pipeline until a signal arrives, so dropping the
/// future early just stops listening.
///
/// # Example
///
/// ```no_run
/// use transit_dl::{Config, PipelineManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = PipelineManager::from_config(Config::default()).await?;
///     manager.start().await;
///
///     run_with_shutdown(manager).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: PipelineManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await
}

/// Resolve on the first SIGTERM or SIGINT
///
/// A handler that cannot be registered is logged and left out; with neither
/// available the wait falls back to `ctrl_c`.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    async fn next(handler: &mut Option<Signal>) {
        match handler {
            Some(handler) => {
                handler.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let register = |kind: SignalKind, label: &'static str| {
        signal(kind)
            .inspect_err(|e| tracing::warn!(signal = label, error = %e, "Signal handler unavailable"))
            .ok()
    };
    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigint = register(SignalKind::interrupt(), "SIGINT");

    if sigterm.is_none() && sigint.is_none() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "No way to listen for termination signals");
        }
        return;
    }

    let received = tokio::select! {
        _ = next(&mut sigterm) => "SIGTERM",
        _ = next(&mut sigint) => "SIGINT",
    };
    tracing::info!(signal = received, "Termination signal received");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Termination signal received"),
        Err(e) => tracing::error!(error = %e, "No way to listen for Ctrl+C"),
    }
}
