//! Pipeline manager split into focused submodules.
//!
//! The `PipelineManager` struct and its methods are organized by concern:
//! - [`submit`] - Task creation and engine start-up
//! - [`supervisor`] - Download-completion supervision loop
//! - [`upload_driver`] - Resumable upload state machine and retry policy
//! - [`status`] - Human-readable status projection
//! - [`registry`] - Registry collections and membership queries
//! - [`auth_ops`] - Authorization flow entry points
//! - [`lifecycle`] - Startup and shutdown coordination

mod auth_ops;
mod lifecycle;
mod registry;
mod status;
mod submit;
mod supervisor;
mod task;
mod upload_driver;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub(crate) use registry::Registries;

use crate::auth::{Authorizer, ClientSecrets, CredentialStore, OAuthClient};
use crate::config::Config;
use crate::engine::{CompletionSignal, DownloadEngine, HttpDownloadEngine};
use crate::error::{Error, Result};
use crate::storage::{DriveClient, StorageClient};
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_util::sync::CancellationToken;

/// Wake-ups shared between the submitting side and the two background loops
#[derive(Clone, Default)]
pub(crate) struct Signals {
    /// Fired by the engine whenever a transfer reaches its outcome
    pub(crate) download_done: CompletionSignal,
    /// Fired whenever a task enters the upload registry
    pub(crate) upload_ready: Arc<Notify>,
}

/// Background loop handles and the shutdown switch
#[derive(Clone)]
pub(crate) struct Lifecycle {
    pub(crate) cancel: CancellationToken,
    /// Cleared by `shutdown`; `submit` refuses new work afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
    pub(crate) workers: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Download → upload pipeline (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct PipelineManager {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Download, upload, error and completed registries behind one lock
    pub(crate) registries: Arc<Mutex<Registries>>,
    /// Starts transfers
    pub(crate) engine: Arc<dyn DownloadEngine>,
    /// Opens resumable upload sessions
    pub(crate) storage: Arc<dyn StorageClient>,
    /// Credential store and authorization flow
    pub(crate) authorizer: Arc<Authorizer>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) signals: Signals,
    pub(crate) lifecycle: Lifecycle,
}

impl PipelineManager {
    /// Create a manager around explicit collaborators
    ///
    /// Validates `config` and creates the download directory. Background loops
    /// are not running until [`start`](Self::start) is called.
    pub async fn new(
        config: Config,
        engine: Arc<dyn DownloadEngine>,
        storage: Arc<dyn StorageClient>,
        authorizer: Arc<Authorizer>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        // Buffer of 1000 events; slow subscribers see RecvError::Lagged
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            registries: Arc::new(Mutex::new(Registries::default())),
            engine,
            storage,
            authorizer,
            event_tx,
            signals: Signals::default(),
            lifecycle: Lifecycle::default(),
        })
    }

    /// Create a manager wired to the HTTP engine, Google Drive and the OAuth token endpoint
    ///
    /// Reads the client secrets file and the persisted credential named in `config.auth`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let user_agent = config.auth.application_name.clone();

        let engine = HttpDownloadEngine::new(&user_agent)?;
        let storage = DriveClient::new(
            config.upload.upload_endpoint.clone(),
            config.upload.folder_id.clone(),
            &user_agent,
        )?;
        let secrets = ClientSecrets::from_file(&config.auth.client_secret_file)?;
        let endpoint = OAuthClient::new(secrets, config.auth.scope.clone(), &user_agent)?;
        let store = CredentialStore::open(config.auth.credential_file.clone()).await;
        let authorizer = Authorizer::new(store, Arc::new(endpoint));

        tracing::info!(
            download_dir = %config.download_dir().display(),
            authorized = authorizer.is_authorized(),
            "Pipeline configured"
        );

        Self::new(
            config,
            Arc::new(engine),
            Arc::new(storage),
            Arc::new(authorizer),
        )
        .await
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use transit_dl::{Config, PipelineManager};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let manager = PipelineManager::from_config(Config::default()).await?;
    ///
    ///     let mut events = manager.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "pipeline event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
