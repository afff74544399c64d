//! OAuth authentication for Gmail API
//!
//! Handles the OAuth 2.0 pieces the credential store builds on:
//! - Loading client credentials
//! - Token exchange and refresh round-trips
//! - Interactive browser-based authorization

use std::collections::HashMap;
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};

use crate::error::{AuthError, GmailMcpError, Result};

/// Seconds before the recorded expiry at which a token is treated as expired
pub const EXPIRY_SKEW_SECS: i64 = 300;

/// OAuth client credentials
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthKeys {
    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Auth URI
    pub auth_uri: String,

    /// Token URI
    pub token_uri: String,
}

impl OAuthKeys {
    /// Load OAuth keys from a client-secret descriptor file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a client-secret descriptor ("installed" or "web" application)
    pub fn parse(content: &str) -> Result<Self> {
        let keys_file: OAuthKeysFile = serde_json::from_str(content)?;
        keys_file
            .installed
            .or(keys_file.web)
            .ok_or(GmailMcpError::Auth(AuthError::InvalidKeysFormat))
    }

    /// The subset of the keys needed to talk to the token endpoint
    pub fn token_client(&self) -> TokenClient {
        TokenClient {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_uri: self.token_uri.clone(),
        }
    }
}

/// OAuth keys file format
#[derive(Debug, Deserialize)]
struct OAuthKeysFile {
    installed: Option<OAuthKeys>,
    web: Option<OAuthKeys>,
}

/// Stored credentials (tokens), persisted as the token file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Access token
    #[serde(alias = "token")]
    pub access_token: String,

    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiry timestamp (Unix seconds); older files carry an RFC 3339 `expiry`
    #[serde(
        default,
        alias = "expiry",
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_date: Option<i64>,

    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Client identity used to refresh without the credentials file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiry {
    Seconds(i64),
    Text(String),
}

fn deserialize_expiry<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<RawExpiry>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawExpiry::Seconds(secs)) => Ok(Some(secs)),
        Some(RawExpiry::Text(text)) => parse_expiry(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid expiry timestamp '{}'", text))),
    }
}

/// Parse an RFC 3339 expiry; a timestamp without offset is taken as UTC
fn parse_expiry(text: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

impl StoredCredentials {
    /// Whether the access token has expired (or is about to) at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry_date
            .map(|expiry| expiry.saturating_sub(now) < EXPIRY_SKEW_SECS)
            .unwrap_or(false)
    }

    /// Whether the access token can be used as-is at `now`
    pub fn is_valid(&self, now: i64) -> bool {
        !self.access_token.is_empty() && !self.is_expired(now)
    }

    /// Whether the granted scopes include every required scope.
    /// An empty scope list is accepted as a token written without scope info.
    pub fn covers(&self, required: &[String]) -> bool {
        self.scopes.is_empty() || required.iter().all(|s| self.scopes.contains(s))
    }

    /// Token endpoint identity recorded alongside the tokens, if complete
    pub fn token_client(&self) -> Option<TokenClient> {
        Some(TokenClient {
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone()?,
            token_uri: self.token_uri.clone()?,
        })
    }
}

/// Token response from OAuth token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    /// Turn a token response into persistable credentials
    pub fn into_credentials(
        self,
        client: &TokenClient,
        previous_refresh_token: Option<String>,
        requested_scopes: &[String],
    ) -> StoredCredentials {
        let now = unix_now();
        let scopes: Vec<String> = self.scope.split_whitespace().map(str::to_string).collect();

        StoredCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh_token),
            token_type: self.token_type,
            expiry_date: self.expires_in.map(|e| now + e),
            scopes: if scopes.is_empty() {
                requested_scopes.to_vec()
            } else {
                scopes
            },
            client_id: Some(client.client_id.clone()),
            client_secret: Some(client.client_secret.clone()),
            token_uri: Some(client.token_uri.clone()),
        }
    }
}

/// Client identity at the OAuth token endpoint
#[derive(Debug, Clone)]
pub struct TokenClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
}

impl TokenClient {
    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        http_client: &reqwest::Client,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = http_client.post(&self.token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::TokenExchangeFailed {
                message: text,
            }));
        }

        Ok(response.json().await?)
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(
        &self,
        http_client: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = http_client.post(&self.token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::RefreshRejected {
                message: format!("{}: {}", status, text),
            }));
        }

        Ok(response.json().await?)
    }
}

/// Current time in Unix seconds
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Obtains a brand-new credential from a client-secret descriptor
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, keys: &OAuthKeys, scopes: &[String]) -> Result<StoredCredentials>;
}

/// Interactive authorization through the browser and a local callback listener
pub struct LoopbackAuthorizer {
    http_client: reqwest::Client,
    callback_port: u16,
}

impl LoopbackAuthorizer {
    pub fn new(callback_port: u16) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            callback_port,
        }
    }
}

/// Generate the authorization URL
pub fn generate_auth_url(keys: &OAuthKeys, redirect_uri: &str, scopes: &[String]) -> String {
    let scopes = scopes.join(" ");
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        keys.auth_uri,
        urlencoding::encode(&keys.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes)
    )
}

#[async_trait]
impl Authorizer for LoopbackAuthorizer {
    async fn authorize(&self, keys: &OAuthKeys, scopes: &[String]) -> Result<StoredCredentials> {
        use axum::{extract::Query, response::Html, routing::get, Router};

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.callback_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://localhost:{}/oauth2callback", port);

        let auth_url = generate_auth_url(keys, &redirect_uri, scopes);
        eprintln!("\nPlease visit this URL to authorize Gmail access:");
        eprintln!("{}\n", auth_url);

        if let Err(e) = open::that(&auth_url) {
            tracing::warn!("Could not open browser automatically: {}", e);
        }

        let (tx, rx) = oneshot::channel::<std::result::Result<String, String>>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let callback_handler = move |Query(params): Query<HashMap<String, String>>| {
            let tx = tx.clone();
            async move {
                let outcome = match (params.get("code"), params.get("error")) {
                    (Some(code), _) => Ok(code.clone()),
                    (None, Some(error)) => Err(error.clone()),
                    (None, None) => Err("no authorization code in callback".to_string()),
                };
                let succeeded = outcome.is_ok();
                if let Some(tx) = tx.lock().await.take() {
                    let _ = tx.send(outcome);
                }
                if succeeded {
                    Html("<html><body><h1>Authorization complete</h1><p>You can close this window.</p></body></html>")
                } else {
                    Html("<html><body><h1>Authorization failed</h1><p>Return to the terminal for details.</p></body></html>")
                }
            }
        };

        let app = Router::new().route("/oauth2callback", get(callback_handler));

        tracing::info!("Waiting for OAuth callback on port {}", port);

        let code = tokio::select! {
            result = axum::serve(listener, app).into_future() => {
                let message = match result {
                    Ok(()) => "callback listener stopped".to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(GmailMcpError::Auth(AuthError::CallbackError { message }));
            }
            outcome = rx => match outcome {
                Ok(Ok(code)) => code,
                Ok(Err(message)) => {
                    return Err(GmailMcpError::Auth(AuthError::CallbackError { message }));
                }
                Err(_) => return Err(GmailMcpError::Auth(AuthError::NoAuthCode)),
            },
        };

        tracing::info!("Received authorization code, exchanging for tokens");

        let client = keys.token_client();
        let response = client
            .exchange_code(&self.http_client, &code, &redirect_uri)
            .await?;

        Ok(response.into_credentials(&client, None, scopes))
    }
}
