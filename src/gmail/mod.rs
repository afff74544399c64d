//! Gmail API module
//!
//! Contains types, authentication, the credential store, and the client for
//! interacting with the Gmail API.

pub mod auth;
pub mod client;
pub mod credentials;
pub mod types;
pub mod utils;
