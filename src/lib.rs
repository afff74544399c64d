//! Gmail MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing Gmail search, read, send and
//! label listing as tools.

pub mod config;
pub mod context;
pub mod error;
pub mod gmail;
pub mod mcp;

pub use config::Config;
pub use context::ServerContext;
pub use error::{GmailMcpError, Result};
