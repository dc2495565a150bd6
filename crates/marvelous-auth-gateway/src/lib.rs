//! # Marvelous Auth Gateway
//!
//! Authentication hub of the Marvelous constellation: issues and validates
//! JWTs for frontends and peer services, keeps the inter-service trust
//! registry and the lead credential cache, and bootstraps both from
//! upstream providers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
/// Startup population with provider fallback and retry.
pub mod bootstrap;
/// Message-driven store mutation.
pub mod consumers;
mod server;

pub use auth::{AuthError, Store, TokenEngine};
pub use bootstrap::{BootstrapHandle, BootstrapOrchestrator, BootstrapState, BootstrapStatus};
pub use server::{Gateway, GatewayBuilder, GatewayState, router};

use tokio_util::sync::CancellationToken;

use marvelous_auth_core::config::Config;

/// Start the hub and run until `cancel` fires.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config, cancel: CancellationToken) -> Result<(), GatewayError> {
    let gateway = GatewayBuilder::new().with_config(config).build()?;
    gateway.run(cancel).await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
