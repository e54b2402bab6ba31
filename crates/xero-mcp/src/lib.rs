//! Xero MCP Server
//!
//! A Model Context Protocol (MCP) server for the Xero accounting API. Exposes
//! contacts, invoices, accounts and organisation details as tools for LLM agents.
//!
//! # Features
//!
//! - **Four credential modes**: static bearer, client credentials, browser
//!   authorization code with PKCE, and refreshable tokens from a persisted file
//! - **Single-flight refresh**: concurrent tool calls share one token renewal
//! - **Sessions**: one protocol handler per HTTP session, evicted when idle
//! - **Inbound OAuth**: optional authorization server guarding the HTTP transport
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xero_mcp::{auth::Authenticator, client::XeroClient, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let auth = Arc::new(Authenticator::from_config(&config)?);
//!     let client = XeroClient::new(&config, auth)?;
//!
//!     let organisation = client.get_organisation().await?;
//!     println!("{:?}", organisation.name);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod formatters;
pub mod models;
pub mod server;
pub mod tools;

pub use auth::Authenticator;
pub use client::XeroClient;
pub use config::Config;
pub use error::{AuthError, ClientError, SessionError, ToolError};
