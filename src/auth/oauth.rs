//! OAuth 2.0 installed-application flow against a token endpoint

use super::credential::Credential;
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Out-of-band redirect: the consent page shows the code for the user to paste
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration, as downloaded from the provider console
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ClientSecrets {
    /// Client ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Consent page
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Load a client secrets file carrying an `installed` or `web` section
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let secrets_err = |reason: String| AuthError::Secrets {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| secrets_err(e.to_string()))?;
        Self::from_json(&content).map_err(secrets_err)
    }

    fn from_json(content: &str) -> Result<Self, String> {
        let file: SecretsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "neither an 'installed' nor a 'web' section is present".to_string())
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The provider side of the authorization flow
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Consent page URL the user must visit
    fn authorization_url(&self) -> Result<String, AuthError>;

    /// Trade a pasted authorization code for a credential
    async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError>;

    /// Mint a fresh access token from `credential`'s refresh token
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize, Default)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn reason(&self, status: reqwest::StatusCode) -> String {
        match (&self.error_description, self.error.is_empty()) {
            (Some(desc), _) => format!("{}: {}", self.error, desc),
            (None, false) => self.error.clone(),
            (None, true) => format!("token endpoint answered HTTP {}", status),
        }
    }
}

/// [`TokenEndpoint`] over HTTP
#[derive(Clone, Debug)]
pub struct OAuthClient {
    http: reqwest::Client,
    secrets: ClientSecrets,
    scope: String,
}

impl OAuthClient {
    /// Build a client for `secrets` requesting `scope`
    pub fn new(
        secrets: ClientSecrets,
        scope: impl Into<String>,
        user_agent: &str,
    ) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            secrets,
            scope: scope.into(),
        })
    }

    /// POST a form to the token endpoint and return the raw status and body
    async fn post_token(
        &self,
        form: &[(&str, &str)],
    ) -> Result<(reqwest::StatusCode, String), AuthError> {
        let response = self
            .http
            .post(&self.secrets.token_uri)
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    fn credential_from(
        &self,
        token: TokenResponse,
        previous_refresh: Option<String>,
    ) -> Credential {
        Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(previous_refresh),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            token_uri: self.secrets.token_uri.clone(),
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            scope: token.scope.unwrap_or_else(|| self.scope.clone()),
        }
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    fn authorization_url(&self) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", OOB_REDIRECT_URI),
                ("scope", self.scope.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
            ],
        )
        .map_err(|e| AuthError::Secrets {
            path: "auth_uri".into(),
            reason: e.to_string(),
        })?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::InvalidCode("empty authorization code".to_string()));
        }

        let form = [
            ("code", code),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", OOB_REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ];
        let (status, body) = self.post_token(&form).await?;
        if status.is_success() {
            return Ok(self.credential_from(parse_token(&body)?, None));
        }
        let reason = TokenErrorResponse::parse(&body).reason(status);
        if status.is_client_error() {
            Err(AuthError::InvalidCode(reason))
        } else {
            Err(AuthError::Network(reason))
        }
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            return Err(AuthError::RefreshFailed(
                "credential carries no refresh token".to_string(),
            ));
        };

        let form = [
            ("refresh_token", refresh_token),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let (status, body) = self.post_token(&form).await?;
        if !status.is_success() {
            return Err(AuthError::RefreshFailed(
                TokenErrorResponse::parse(&body).reason(status),
            ));
        }
        tracing::debug!("Refreshed access token");
        Ok(self.credential_from(parse_token(&body)?, credential.refresh_token.clone()))
    }
}

fn parse_token(body: &str) -> Result<TokenResponse, AuthError> {
    serde_json::from_str(body)
        .map_err(|e| AuthError::Network(format!("malformed token response: {}", e)))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn secrets(token_uri: String) -> ClientSecrets {
        ClientSecrets {
            client_id: "client-1".to_string(),
            client_secret: "shh".to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri,
        }
    }

    #[test]
    fn secrets_accept_installed_or_web_sections() {
        let installed = ClientSecrets::from_json(
            r#"{"installed":{"client_id":"a","client_secret":"b"}}"#,
        )
        .unwrap();
        assert_eq!(installed.client_id, "a");
        assert_eq!(installed.token_uri, DEFAULT_TOKEN_URI);

        let web = ClientSecrets::from_json(
            r#"{"web":{"client_id":"c","client_secret":"d","token_uri":"https://t"}}"#,
        )
        .unwrap();
        assert_eq!(web.token_uri, "https://t");

        assert!(ClientSecrets::from_json(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn missing_secrets_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secret.json");
        match ClientSecrets::from_file(&path) {
            Err(AuthError::Secrets { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Secrets error, got {other:?}"),
        }
    }

    #[test]
    fn authorization_url_requests_offline_access() {
        let client = OAuthClient::new(secrets("https://t".to_string()), "scope-x", "test").unwrap();
        let url = Url::parse(&client.authorization_url().unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["redirect_uri"], OOB_REDIRECT_URI);
        assert_eq!(params["scope"], "scope-x");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
    }

    #[tokio::test]
    async fn exchange_code_builds_a_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let client =
            OAuthClient::new(secrets(format!("{}/token", server.uri())), "scope-x", "test").unwrap();
        let credential = client.exchange_code(" abc\n").await.unwrap();

        assert_eq!(credential.access_token, "at");
        assert_eq!(credential.refresh_token.as_deref(), Some("rt"));
        assert_eq!(credential.scope, "scope-x");
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn rejected_code_is_invalid_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Malformed auth code."
            })))
            .mount(&server)
            .await;

        let client =
            OAuthClient::new(secrets(format!("{}/token", server.uri())), "scope-x", "test").unwrap();
        match client.exchange_code("bad").await {
            Err(AuthError::InvalidCode(reason)) => assert!(reason.contains("invalid_grant")),
            other => panic!("expected InvalidCode, got {other:?}"),
        }
        assert!(matches!(
            client.exchange_code("   ").await,
            Err(AuthError::InvalidCode(_))
        ));
    }

    #[tokio::test]
    async fn refresh_keeps_the_existing_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-2",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let client =
            OAuthClient::new(secrets(format!("{}/token", server.uri())), "scope-x", "test").unwrap();
        let old = Credential {
            access_token: "at-1".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: Some(Utc::now()),
            token_uri: format!("{}/token", server.uri()),
            client_id: "client-1".to_string(),
            client_secret: "shh".to_string(),
            scope: "scope-x".to_string(),
        };

        let fresh = client.refresh(&old).await.unwrap();
        assert_eq!(fresh.access_token, "at-2");
        assert_eq!(fresh.refresh_token.as_deref(), Some("rt"));

        let no_refresh = Credential {
            refresh_token: None,
            ..old
        };
        assert!(matches!(
            client.refresh(&no_refresh).await,
            Err(AuthError::RefreshFailed(_))
        ));
    }
}
