//! Process-wide server context
//!
//! Built once at startup and shared by handle with the tool handler.

use crate::config::Config;
use crate::gmail::auth::{Authorizer, LoopbackAuthorizer};
use crate::gmail::client::GmailClient;
use crate::gmail::credentials::CredentialStore;
use crate::mcp::tools::ToolRegistry;

/// Everything a tool call needs: configuration, credentials, API client and registry
pub struct ServerContext {
    pub config: Config,
    pub credentials: CredentialStore,
    pub gmail: GmailClient,
    pub registry: ToolRegistry,
}

impl ServerContext {
    /// Build a context with a custom authorizer
    pub fn new(config: Config, authorizer: Box<dyn Authorizer>) -> Self {
        let credentials = CredentialStore::new(&config, authorizer);
        let gmail = GmailClient::with_base_url(config.api_base_url.clone());

        Self {
            config,
            credentials,
            gmail,
            registry: ToolRegistry::new(),
        }
    }

    /// Build a context that authorizes interactively through the browser
    pub fn from_config(config: Config) -> Self {
        let authorizer = LoopbackAuthorizer::new(config.oauth_callback_port);
        Self::new(config, Box::new(authorizer))
    }
}
