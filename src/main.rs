//! Gmail MCP Server
//!
//! Serves the Gmail tools over stdio, or runs the OAuth flow with `auth`.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use gmail_mcp::config::Config;
use gmail_mcp::context::ServerContext;
use gmail_mcp::mcp::handler::ToolHandler;
use gmail_mcp::mcp::server::McpServer;

/// Gmail MCP Server
#[derive(Parser)]
#[command(name = "gmail-mcp")]
#[command(author, version, about = "Gmail MCP Server - A Model Context Protocol server for Gmail")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize Gmail access and write the token file
    Auth,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::new().context("failed to load configuration")?;
    let context = Arc::new(ServerContext::from_config(config));

    match cli.command {
        Some(Commands::Auth) => {
            context
                .credentials
                .authorize()
                .await
                .context("authorization failed")?;
            eprintln!(
                "Authorization complete. Token saved to {}",
                context.config.token_path.display()
            );
        }
        None => run_server(context).await?,
    }

    Ok(())
}

async fn run_server(context: Arc<ServerContext>) -> anyhow::Result<()> {
    context
        .credentials
        .preflight()
        .context("cannot start without credentials")?;

    tracing::info!(
        token = %context.config.token_path.display(),
        token_present = context.config.token_file_exists(),
        credentials_present = context.config.credentials_file_exists(),
        "Starting Gmail MCP server on stdio"
    );

    let server = McpServer::new(ToolHandler::new(context));
    server.run_stdio().await.context("transport failure")?;

    Ok(())
}
