//! oauth-relay Library
//!
//! Server-side OAuth 2.0 Authorization Code middleware: a multi-tenant HTTP
//! service that performs the code-for-token exchange on behalf of browser-only
//! single-page applications.
//!
//! # Features
//!
//! - **Multi-Tenant**: one listener multiplexes any number of `(clientId,
//!   tokenUri)` tenants from configuration
//! - **State Envelope**: caller context round-trips through the authorization
//!   server as base64 JSON in the OAuth `state` parameter
//! - **Fragment Delivery**: tokens reach the SPA in the URL fragment, never a
//!   server log
//! - **Hot Reload**: the config file is polled and published atomically, with
//!   dynamic listener rebinding on port changes
//! - **Simulator**: a built-in fake provider for integration tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod reload;
pub mod server;
pub mod simulator;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Currently infallible; returns `Result` so callers fail uniformly if a
/// writer layer is added later.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
