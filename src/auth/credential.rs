//! Persisted OAuth credential and its on-disk store

use crate::error::AuthError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Tokens are treated as expired this long before their actual expiry
const EXPIRY_SKEW_SECS: i64 = 60;

/// An OAuth credential as stored on disk
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Long-lived token used to mint new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token stops working
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Token endpoint the credential was issued by
    pub token_uri: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Granted scope
    #[serde(default)]
    pub scope: String,
}

impl Credential {
    /// Whether the access token is expired (or about to be) at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= at)
    }

    /// Whether the access token is expired right now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Holds the current credential and mirrors it to a JSON file
///
/// Readers observe replacements through a [`watch`] channel, so the upload
/// driver picks up a fresh credential on its next session.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    tx: watch::Sender<Option<Credential>>,
}

impl CredentialStore {
    /// Load the credential at `path`
    ///
    /// A missing or unreadable file yields an unauthorized store rather than an error.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Credential>(&bytes) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid credential file");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read credential file");
                None
            }
        };
        Self::with_credential(path, initial)
    }

    /// Build a store around an already loaded credential
    pub fn with_credential(path: impl Into<PathBuf>, credential: Option<Credential>) -> Self {
        let (tx, _) = watch::channel(credential);
        Self {
            path: path.into(),
            tx,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a credential is present
    pub fn is_authorized(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Copy of the current credential
    pub fn current(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    /// Persist `credential` and make it current
    pub async fn store(&self, credential: Credential) -> Result<(), AuthError> {
        let store_err = |reason: String| AuthError::Store {
            path: self.path.clone(),
            reason,
        };

        let json = serde_json::to_vec_pretty(&credential).map_err(|e| store_err(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_err(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| store_err(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| store_err(e.to_string()))?;

        self.tx.send_replace(Some(credential));
        tracing::info!(path = %self.path.display(), "Stored credential");
        Ok(())
    }

    /// Resolve once a credential is present
    pub async fn wait_until_authorized(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(Option::is_some).await;
    }
}
