//! Configuration management for the Gmail MCP Server
//!
//! Handles file locations, environment variables, and Gmail API constants.

use std::path::PathBuf;

use crate::error::{ConfigError, GmailMcpError, Result};

/// Configuration for the Gmail MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to stored credentials (access/refresh tokens)
    pub token_path: PathBuf,

    /// Path to the OAuth client-secret descriptor
    pub credentials_path: PathBuf,

    /// Port for the OAuth callback listener (0 picks a free port)
    pub oauth_callback_port: u16,

    /// Base URL of the Gmail REST API
    pub api_base_url: String,

    /// Gmail API scopes
    pub scopes: Vec<String>,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let token_path = std::env::var("GMAIL_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_FILE));

        let credentials_path = std::env::var("GMAIL_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CREDENTIALS_FILE));

        let mut config = Self::with_paths(token_path, credentials_path);

        if let Ok(port) = std::env::var("GMAIL_OAUTH_PORT") {
            config.oauth_callback_port = parse_port(&port)?;
        }

        if let Ok(url) = std::env::var("GMAIL_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    /// Create a configuration with explicit token and credentials paths
    pub fn with_paths(token_path: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            credentials_path: credentials_path.into(),
            oauth_callback_port: 0,
            api_base_url: gmail::API_BASE_URL.to_string(),
            scopes: gmail::SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check if the client-secret descriptor exists
    pub fn credentials_file_exists(&self) -> bool {
        self.credentials_path.exists()
    }

    /// Check if a token file exists
    pub fn token_file_exists(&self) -> bool {
        self.token_path.exists()
    }
}

/// Default token file, relative to the working directory
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Default client-secret descriptor, relative to the working directory
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

fn parse_port(value: &str) -> Result<u16> {
    value.trim().parse().map_err(|_| {
        GmailMcpError::Config(ConfigError::InvalidConfig {
            message: format!("GMAIL_OAUTH_PORT must be a port number, got '{}'", value),
        })
    })
}

/// Gmail API constants
pub mod gmail {
    /// Base URL for Gmail API
    pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// Scopes requested during authorization
    pub const SCOPES: [&str; 3] = [
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/gmail.send",
        "https://www.googleapis.com/auth/gmail.modify",
    ];
}
