//! Authorization flow entry points.

use super::PipelineManager;
use crate::error::{AuthError, Result};
use crate::types::Event;

impl PipelineManager {
    /// Whether the upload driver may open sessions
    pub fn is_authorized(&self) -> bool {
        self.authorizer.is_authorized()
    }

    /// Start the authorization flow and return the consent page URL
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::AlreadyAuthorized`] when a credential is present.
    pub fn authorization_url(&self) -> Result<String> {
        Ok(self.authorizer.authorization_url()?)
    }

    /// Exchange the code shown on the consent page for a credential
    ///
    /// Returns `Ok(true)` once authorized. A rejected code returns `Ok(false)`
    /// and the flow must be restarted with [`authorization_url`](Self::authorization_url).
    /// The upload driver picks up the new credential on its next session.
    pub async fn exchange_code(&self, code: &str) -> Result<bool> {
        match self.authorizer.exchange_code(code).await {
            Ok(()) => {
                self.emit_event(Event::Authorized);
                Ok(true)
            }
            Err(AuthError::InvalidCode(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
