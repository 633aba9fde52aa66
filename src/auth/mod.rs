//! Credential store and OAuth authorization flow
//!
//! [`CredentialStore`] owns the persisted [`Credential`]. [`Authorizer`] runs the
//! two-step installed-application flow through a [`TokenEndpoint`] and hands
//! bearer tokens to the upload driver, refreshing them when they expire.

mod authorizer;
mod credential;
mod oauth;

pub use authorizer::Authorizer;
pub use credential::{Credential, CredentialStore};
pub use oauth::{ClientSecrets, OAuthClient, OOB_REDIRECT_URI, TokenEndpoint};
