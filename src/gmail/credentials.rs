//! Credential store
//!
//! Resolves an authenticated [`Session`] from the token file, refreshing or
//! re-authorizing as needed, and persists every new credential.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::{AuthError, ConfigError, GmailMcpError, Result};
use crate::gmail::auth::{unix_now, Authorizer, OAuthKeys, StoredCredentials};

/// Authenticated handle for calls to the Gmail API
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    access_token: String,
    scopes: Vec<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            access_token: access_token.into(),
            scopes,
        }
    }

    /// Bearer token for API requests
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Scopes the session was granted
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Loads, refreshes and persists the single credential of this process
pub struct CredentialStore {
    token_path: PathBuf,
    credentials_path: PathBuf,
    scopes: Vec<String>,
    http_client: reqwest::Client,
    authorizer: Box<dyn Authorizer>,
}

impl CredentialStore {
    pub fn new(config: &Config, authorizer: Box<dyn Authorizer>) -> Self {
        Self {
            token_path: config.token_path.clone(),
            credentials_path: config.credentials_path.clone(),
            scopes: config.scopes.clone(),
            http_client: reqwest::Client::new(),
            authorizer,
        }
    }

    /// Fail early when there is neither a token file nor a credentials file
    pub fn preflight(&self) -> Result<()> {
        if !self.token_path.exists() && !self.credentials_path.exists() {
            return Err(self.missing_credentials_file());
        }
        Ok(())
    }

    /// Resolve a session, re-reading the token file on every call
    pub async fn get_session(&self) -> Result<Session> {
        let now = unix_now();

        if let Some(creds) = self.load_token().await {
            if !creds.covers(&self.scopes) {
                tracing::info!("Stored token lacks required scopes, re-authorizing");
            } else if creds.is_valid(now) {
                return Ok(self.session_from(&creds));
            } else if let (true, Some(refresh_token)) =
                (creds.is_expired(now), creds.refresh_token.clone())
            {
                let refreshed = self.refresh(&creds, &refresh_token).await?;
                return Ok(self.session_from(&refreshed));
            }
        }

        self.authorize().await
    }

    /// Run the interactive authorization flow and persist the result
    pub async fn authorize(&self) -> Result<Session> {
        if !self.credentials_path.exists() {
            return Err(self.missing_credentials_file());
        }

        let keys = OAuthKeys::load(&self.credentials_path)?;
        tracing::info!("No usable token, starting interactive authorization");

        let creds = self.authorizer.authorize(&keys, &self.scopes).await?;
        self.save_token(&creds).await?;

        Ok(self.session_from(&creds))
    }

    async fn refresh(&self, creds: &StoredCredentials, refresh_token: &str) -> Result<StoredCredentials> {
        let client = match creds.token_client() {
            Some(client) => client,
            None => {
                if !self.credentials_path.exists() {
                    return Err(self.missing_credentials_file());
                }
                OAuthKeys::load(&self.credentials_path)?.token_client()
            }
        };

        tracing::info!("Access token expired, refreshing");

        let response = match client.refresh(&self.http_client, refresh_token).await {
            Ok(response) => response,
            Err(e @ GmailMcpError::Auth(AuthError::RefreshRejected { .. })) => {
                self.forget_refresh_token(creds).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let refreshed = response.into_credentials(&client, Some(refresh_token.to_string()), &self.scopes);
        self.save_token(&refreshed).await?;

        Ok(refreshed)
    }

    /// Drop a revoked refresh token so the next session request re-authorizes
    async fn forget_refresh_token(&self, creds: &StoredCredentials) {
        let revoked = StoredCredentials {
            refresh_token: None,
            ..creds.clone()
        };
        if let Err(e) = self.save_token(&revoked).await {
            tracing::warn!("Could not clear revoked refresh token: {}", e);
        }
    }

    /// Read the token file; a missing or unreadable file means no credential
    async fn load_token(&self) -> Option<StoredCredentials> {
        let content = match tokio::fs::read_to_string(&self.token_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Could not read token file {}: {}", self.token_path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(creds) => Some(creds),
            Err(e) => {
                tracing::warn!("Ignoring malformed token file {}: {}", self.token_path.display(), e);
                None
            }
        }
    }

    async fn save_token(&self, credentials: &StoredCredentials) -> Result<()> {
        let content = serde_json::to_string_pretty(credentials)?;
        tokio::fs::write(&self.token_path, content).await?;
        tracing::debug!("Token written to {}", self.token_path.display());
        Ok(())
    }

    fn session_from(&self, creds: &StoredCredentials) -> Session {
        let scopes = if creds.scopes.is_empty() {
            self.scopes.clone()
        } else {
            creds.scopes.clone()
        };
        Session::new(creds.access_token.clone(), scopes)
    }

    fn missing_credentials_file(&self) -> GmailMcpError {
        GmailMcpError::Config(ConfigError::CredentialsFileNotFound {
            path: self.credentials_path.display().to_string(),
        })
    }
}
