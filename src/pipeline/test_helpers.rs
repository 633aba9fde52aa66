//! Shared test helpers: fake collaborators and a ready-made pipeline.

use crate::auth::{Authorizer, Credential, CredentialStore, TokenEndpoint};
use crate::config::Config;
use crate::engine::{
    CompletionSignal, DownloadEngine, DownloadOutcome, DownloadRequest, DownloadTransfer,
    validate_url,
};
use crate::error::{AuthError, SubmissionError, UploadError};
use crate::pipeline::PipelineManager;
use crate::storage::{ChunkOutcome, ChunkProgress, StorageClient, UploadSession, UploadSource};
use crate::types::{DownloadProgress, RegistryKind, Stage, TaskId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Download engine
// ---------------------------------------------------------------------------

/// A transfer the test finishes by hand
pub(crate) struct FakeTransfer {
    pub(crate) destination: PathBuf,
    signal: CompletionSignal,
    progress: Mutex<DownloadProgress>,
    outcome: Mutex<Option<DownloadOutcome>>,
    pub(crate) cancelled: AtomicBool,
}

impl FakeTransfer {
    pub(crate) fn set_progress(&self, progress: DownloadProgress) {
        *self.progress.lock().unwrap() = progress;
    }

    /// Write `content` to the destination and report success
    pub(crate) fn complete(&self, content: &[u8]) {
        std::fs::write(&self.destination, content).unwrap();
        let len = content.len() as u64;
        self.set_progress(DownloadProgress {
            downloaded_bytes: len,
            total_bytes: Some(len),
            speed_bps: 0.0,
        });
        *self.outcome.lock().unwrap() = Some(DownloadOutcome::Succeeded);
        self.signal.notify();
    }

    /// Report failure without touching the file system
    pub(crate) fn fail(&self, reason: &str) {
        *self.outcome.lock().unwrap() = Some(DownloadOutcome::Failed(reason.to_string()));
        self.signal.notify();
    }
}

impl DownloadTransfer for FakeTransfer {
    fn progress(&self) -> DownloadProgress {
        *self.progress.lock().unwrap()
    }

    fn outcome(&self) -> Option<DownloadOutcome> {
        self.outcome.lock().unwrap().clone()
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Engine that records transfers instead of fetching anything
///
/// Hosts containing `invalid` are rejected the way a real engine rejects an
/// unresolvable host.
#[derive(Default)]
pub(crate) struct FakeEngine {
    transfers: Mutex<Vec<Arc<FakeTransfer>>>,
}

impl FakeEngine {
    pub(crate) fn transfer(&self, index: usize) -> Arc<FakeTransfer> {
        Arc::clone(&self.transfers.lock().unwrap()[index])
    }

    pub(crate) fn started(&self) -> usize {
        self.transfers.lock().unwrap().len()
    }
}

impl DownloadEngine for FakeEngine {
    fn start(
        &self,
        request: DownloadRequest,
        signal: CompletionSignal,
    ) -> Result<Arc<dyn DownloadTransfer>, SubmissionError> {
        let url = validate_url(&request.url)?;
        if url.host_str().is_some_and(|h| h.contains("invalid")) {
            return Err(SubmissionError::InvalidHost { url: request.url });
        }
        let transfer = Arc::new(FakeTransfer {
            destination: request.destination,
            signal,
            progress: Mutex::new(DownloadProgress::default()),
            outcome: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        });
        self.transfers.lock().unwrap().push(Arc::clone(&transfer));
        Ok(transfer)
    }
}

// ---------------------------------------------------------------------------
// Storage service
// ---------------------------------------------------------------------------

/// One scripted response to `next_chunk`
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// Acknowledge this many bytes in total
    Progress(u64),
    /// Finish the upload
    Done,
    /// Fail with this HTTP status
    Status(u16),
    /// Fail at the transport level
    Network { retryable: bool },
    /// Never answer
    Hang,
}

/// What the fake storage saw
#[derive(Default)]
pub(crate) struct StorageLog {
    pub(crate) sessions: AtomicU32,
    pub(crate) chunks: AtomicU32,
    pub(crate) aborts: AtomicU32,
    pub(crate) uploaded: Mutex<Vec<String>>,
    pub(crate) tokens: Mutex<Vec<String>>,
}

impl StorageLog {
    pub(crate) fn sessions(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn chunks(&self) -> u32 {
        self.chunks.load(Ordering::SeqCst)
    }

    pub(crate) fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

/// Storage client replaying a script shared by all sessions
pub(crate) struct FakeStorage {
    pub(crate) log: Arc<StorageLog>,
    script: Arc<Mutex<VecDeque<Step>>>,
    fallback: Step,
}

impl FakeStorage {
    /// Replay `script`, then answer every further chunk with `fallback`
    pub(crate) fn scripted(script: Vec<Step>, fallback: Step) -> Self {
        Self {
            log: Arc::new(StorageLog::default()),
            script: Arc::new(Mutex::new(script.into())),
            fallback,
        }
    }

    /// Every upload finishes in a single chunk
    pub(crate) fn always_done() -> Self {
        Self::scripted(Vec::new(), Step::Done)
    }

    /// Every chunk fails with `status`
    pub(crate) fn always_status(status: u16) -> Self {
        Self::scripted(Vec::new(), Step::Status(status))
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn create_session(
        &self,
        access_token: &str,
        source: &UploadSource,
    ) -> Result<Box<dyn UploadSession>, UploadError> {
        self.log.sessions.fetch_add(1, Ordering::SeqCst);
        self.log
            .tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            script: Arc::clone(&self.script),
            fallback: self.fallback.clone(),
            name: source.name.clone(),
            size: source.size,
        }))
    }
}

struct FakeSession {
    log: Arc<StorageLog>,
    script: Arc<Mutex<VecDeque<Step>>>,
    fallback: Step,
    name: String,
    size: u64,
}

#[async_trait]
impl UploadSession for FakeSession {
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, UploadError> {
        self.log.chunks.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Progress(sent) => Ok(ChunkOutcome::InProgress(ChunkProgress {
                sent_bytes: sent,
                total_bytes: self.size,
            })),
            Step::Done => {
                self.log.uploaded.lock().unwrap().push(self.name.clone());
                Ok(ChunkOutcome::Done)
            }
            Step::Status(status) => Err(UploadError::from_status(status, "scripted failure")),
            Step::Network { retryable } => Err(UploadError::Network {
                message: "scripted connection reset".to_string(),
                retryable,
            }),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn abort(&mut self) {
        self.log.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Token endpoint
// ---------------------------------------------------------------------------

/// Accepts the code `good`, rejects everything else
pub(crate) struct FakeTokens;

pub(crate) fn credential(token: &str) -> Credential {
    Credential {
        access_token: token.to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: None,
        token_uri: "https://oauth2.example.com/token".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        scope: "https://www.googleapis.com/auth/drive.file".to_string(),
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokens {
    fn authorization_url(&self) -> Result<String, AuthError> {
        Ok("https://consent.example.com/auth?client_id=client".to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        if code == "good" {
            Ok(credential("token-from-code"))
        } else {
            Err(AuthError::InvalidCode(format!("rejected code {}", code)))
        }
    }

    async fn refresh(&self, _credential: &Credential) -> Result<Credential, AuthError> {
        Ok(credential("token-refreshed"))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A started pipeline wired to fakes (keep `_temp_dir` alive)
pub(crate) struct TestPipeline {
    pub(crate) manager: PipelineManager,
    pub(crate) engine: Arc<FakeEngine>,
    pub(crate) storage: Arc<StorageLog>,
    pub(crate) _temp_dir: TempDir,
}

/// Config pointing into `dir` with fast retries and a short poll interval
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.supervisor_poll_interval = Duration::from_millis(50);
    config.upload.max_retries = 3;
    config.retry.initial_delay = Duration::ZERO;
    config.retry.max_delay = Duration::ZERO;
    config.retry.jitter = false;
    config.auth.credential_file = dir.join("credential.json");
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Build a pipeline without starting its loops
pub(crate) async fn create_test_pipeline_with(
    config_fn: impl FnOnce(&mut Config),
    storage: FakeStorage,
    authorized: bool,
) -> TestPipeline {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config_fn(&mut config);

    let store = CredentialStore::with_credential(
        config.auth.credential_file.clone(),
        authorized.then(|| credential("token-1")),
    );
    let authorizer = Arc::new(Authorizer::new(store, Arc::new(FakeTokens)));
    let engine = Arc::new(FakeEngine::default());
    let log = Arc::clone(&storage.log);

    let manager = PipelineManager::new(config, engine.clone(), Arc::new(storage), authorizer)
        .await
        .unwrap();

    TestPipeline {
        manager,
        engine,
        storage: log,
        _temp_dir: temp_dir,
    }
}

/// Build and start a pipeline with default test config
pub(crate) async fn create_test_pipeline(storage: FakeStorage, authorized: bool) -> TestPipeline {
    let pipeline = create_test_pipeline_with(|_| {}, storage, authorized).await;
    pipeline.manager.start().await;
    pipeline
}

/// Poll until the task sits in `kind`, panicking after five seconds
pub(crate) async fn wait_for_registry(manager: &PipelineManager, id: TaskId, kind: RegistryKind) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.locate(id).await != Some(kind) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {id} never reached {kind:?}"));
}

/// Poll until the task reaches `stage`, panicking after five seconds
pub(crate) async fn wait_for_stage(manager: &PipelineManager, id: TaskId, stage: Stage) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.task(id).await.map(|t| t.stage) != Some(stage) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {id} never reached {stage:?}"));
}
