//! Configuration types for transit-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Default Google Drive resumable upload endpoint
pub const DRIVE_UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Download stage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory submitted names are resolved against (default: "~/Downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Upper bound on how long the supervisor sleeps between passes when no
    /// completion signal arrives (default: 1 second)
    #[serde(default = "default_supervisor_poll", with = "duration_serde")]
    pub supervisor_poll_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            supervisor_poll_interval: default_supervisor_poll(),
        }
    }
}

/// Upload stage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Bytes sent per resumable-upload round trip, in MiB (default: 8)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,

    /// Retry budget per upload; reset only when a task's upload begins (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Optional parent folder for uploaded files
    #[serde(default)]
    pub folder_id: Option<String>,

    /// Resumable upload endpoint
    #[serde(default = "default_upload_endpoint")]
    pub upload_endpoint: String,
}

const BYTES_PER_MB: u64 = 1024 * 1024;

impl UploadConfig {
    /// Chunk size in bytes
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.saturating_mul(BYTES_PER_MB)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            max_retries: default_max_retries(),
            folder_id: None,
            upload_endpoint: default_upload_endpoint(),
        }
    }
}

/// Backoff applied before resuming a session after a transient server failure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// OAuth and credential persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth scope requested during authorization
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Client secrets JSON downloaded from the provider console
    #[serde(default = "default_client_secret_file")]
    pub client_secret_file: PathBuf,

    /// Where the obtained credential is persisted
    #[serde(default = "default_credential_file")]
    pub credential_file: PathBuf,

    /// Application identifier sent as the HTTP user agent
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            client_secret_file: default_client_secret_file(),
            credential_file: default_credential_file(),
            application_name: default_application_name(),
        }
    }
}

/// How many terminal tasks are kept for inspection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Completed tasks kept in history, oldest evicted first (default: 100)
    #[serde(default = "default_max_completed")]
    pub max_completed: usize,

    /// Failed tasks kept in the error registry (None = keep forever)
    #[serde(default)]
    pub max_errors: Option<usize>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_completed: default_max_completed(),
            max_errors: None,
        }
    }
}

/// Main configuration for [`PipelineManager`](crate::PipelineManager)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download stage settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Upload stage settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Backoff between transient upload retries
    #[serde(default)]
    pub retry: RetryConfig,

    /// OAuth settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Terminal task retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// How long shutdown waits for the background loops (default: 10 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load a JSON configuration file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size_mb == 0 {
            return Err(Error::Config {
                message: "chunk size must be at least 1 MiB".to_string(),
                key: Some("upload.chunk_size_mb".to_string()),
            });
        }
        if self.upload.chunk_size_mb.checked_mul(BYTES_PER_MB).is_none() {
            return Err(Error::Config {
                message: format!(
                    "chunk size of {} MiB does not fit in a byte count",
                    self.upload.chunk_size_mb
                ),
                key: Some("upload.chunk_size_mb".to_string()),
            });
        }
        if self.auth.scope.trim().is_empty() {
            return Err(Error::Config {
                message: "OAuth scope must not be empty".to_string(),
                key: Some("auth.scope".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff multiplier must be >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

fn default_download_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("Downloads"),
        None => PathBuf::from("./downloads"),
    }
}

fn default_supervisor_poll() -> Duration {
    Duration::from_secs(1)
}

fn default_chunk_size_mb() -> u64 {
    8
}

fn default_max_retries() -> u32 {
    5
}

fn default_upload_endpoint() -> String {
    DRIVE_UPLOAD_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive.file".to_string()
}

fn default_client_secret_file() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_credential_file() -> PathBuf {
    PathBuf::from("credential.json")
}

fn default_application_name() -> String {
    "transit-dl".to_string()
}

fn default_max_completed() -> usize {
    100
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.upload.chunk_size_mb, 8);
        assert_eq!(config.upload.max_retries, 5);
        assert_eq!(config.upload.upload_endpoint, DRIVE_UPLOAD_ENDPOINT);
        assert_eq!(config.retention.max_completed, 100);
        assert!(config.retention.max_errors.is_none());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_sections_override_individual_keys() {
        let json = r#"{
            "upload": { "chunk_size_mb": 16, "max_retries": 2 },
            "download": { "download_dir": "/tmp/dl", "supervisor_poll_interval": 3 },
            "auth": { "scope": "custom-scope" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.upload.chunk_size_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.upload.max_retries, 2);
        assert_eq!(config.download_dir(), &PathBuf::from("/tmp/dl"));
        assert_eq!(
            config.download.supervisor_poll_interval,
            Duration::from_secs(3)
        );
        assert_eq!(config.auth.scope, "custom-scope");
        assert_eq!(config.auth.application_name, "transit-dl");
    }

    #[test]
    fn zero_chunk_size_is_rejected_with_key() {
        let mut config = Config::default();
        config.upload.chunk_size_mb = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("upload.chunk_size_mb"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn oversized_chunk_size_is_rejected_with_key() {
        let mut config = Config::default();
        config.upload.chunk_size_mb = u64::MAX / 1024;
        assert_eq!(config.upload.chunk_size_bytes(), u64::MAX);

        match config.validate() {
            Err(Error::Config { key, message }) => {
                assert_eq!(key.as_deref(), Some("upload.chunk_size_mb"));
                assert!(message.contains("MiB"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }

        config.upload.chunk_size_mb = u64::MAX / (1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_scope_is_rejected() {
        let mut config = Config::default();
        config.auth.scope = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_json_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transit.json");
        std::fs::write(&path, r#"{ "upload": { "chunk_size_mb": 1 } }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.upload.chunk_size_bytes(), 1024 * 1024);

        std::fs::write(&path, r#"{ "upload": { "chunk_size_mb": 0 } }"#).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = Config::from_file("/definitely/not/here.json");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = Config::default();
        config.upload.folder_id = Some("folder-123".to_string());
        config.retention.max_errors = Some(7);

        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(back.upload.folder_id.as_deref(), Some("folder-123"));
        assert_eq!(back.retention.max_errors, Some(7));
        assert_eq!(back.retry.initial_delay, config.retry.initial_delay);
    }
}
