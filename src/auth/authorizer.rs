//! Authorization state machine shared by the front end and the upload driver

use super::credential::CredentialStore;
use super::oauth::TokenEndpoint;
use crate::error::AuthError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Ties a [`CredentialStore`] to a [`TokenEndpoint`]
///
/// The flow is two-step: [`authorization_url`](Self::authorization_url) starts it,
/// [`exchange_code`](Self::exchange_code) finishes it. A rejected code ends the
/// flow and the caller has to ask for a new URL.
pub struct Authorizer {
    store: CredentialStore,
    endpoint: Arc<dyn TokenEndpoint>,
    flow_started: AtomicBool,
}

impl Authorizer {
    /// Create an authorizer over `store`, talking to `endpoint`
    pub fn new(store: CredentialStore, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            store,
            endpoint,
            flow_started: AtomicBool::new(false),
        }
    }

    /// The underlying credential store
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Whether a usable credential is present
    pub fn is_authorized(&self) -> bool {
        self.store.is_authorized()
    }

    /// Start the flow and return the consent page URL
    pub fn authorization_url(&self) -> Result<String, AuthError> {
        if self.is_authorized() {
            return Err(AuthError::AlreadyAuthorized);
        }
        let url = self.endpoint.authorization_url()?;
        self.flow_started.store(true, Ordering::SeqCst);
        Ok(url)
    }

    /// Finish the flow by trading `code` for a credential and persisting it
    pub async fn exchange_code(&self, code: &str) -> Result<(), AuthError> {
        if !self.flow_started.load(Ordering::SeqCst) {
            return Err(AuthError::FlowNotStarted);
        }
        match self.endpoint.exchange_code(code).await {
            Ok(credential) => {
                self.store.store(credential).await?;
                self.flow_started.store(false, Ordering::SeqCst);
                tracing::info!("Authorization complete");
                Ok(())
            }
            Err(e @ AuthError::InvalidCode(_)) => {
                self.flow_started.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, "Authorization code rejected");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// A bearer token for a new upload session, refreshed first if it has expired
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let credential = self.store.current().ok_or(AuthError::NotAuthorized)?;
        if !credential.is_expired() {
            return Ok(credential.access_token);
        }

        tracing::debug!("Access token expired, refreshing");
        let refreshed = self.endpoint.refresh(&credential).await?;
        let token = refreshed.access_token.clone();
        self.store.store(refreshed).await?;
        Ok(token)
    }

    /// Resolve once a credential is present
    pub async fn wait_until_authorized(&self) {
        self.store.wait_until_authorized().await;
    }
}
