//! Command-line interface definitions for `oauth-relay`.
//!
//! Defines the top-level [`Cli`] struct parsed by `clap` and the [`Command`]
//! subcommand enum that drives the binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// OAuth 2.0 Authorization Code middleware for browser-only SPAs
///
/// Terminates the redirect leg of the Authorization Code grant: receives the
/// authorization-server redirect, exchanges the code using the tenant secret
/// from its hot-reloaded configuration, and sends the browser back to the SPA
/// with the result encoded in the URL fragment.
///
/// Run without a subcommand to start the server.
#[derive(Parser, Debug)]
#[command(name = "oauth-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (JSON array)
    #[arg(
        short,
        long,
        default_value = DEFAULT_CONFIG_PATH,
        env = "OAUTH_RELAY_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Port the relay listens on (overrides the config file at startup)
    #[arg(short, long, env = "OAUTH_RELAY_PORT")]
    pub port: Option<i64>,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1", env = "OAUTH_RELAY_HOST")]
    pub host: String,

    /// Minimum log level: trace, debug, info, warn, or error
    #[arg(
        long,
        default_value = "info",
        env = "OAUTH_RELAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log output format: "text" for human-readable, "json" for structured
    #[arg(long, env = "OAUTH_RELAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Exit with a failure code when the listener cannot bind, instead of
    /// staying unbound and retrying on the next config change
    #[arg(long)]
    pub crash_on_bind: bool,

    /// Subcommand to run (defaults to server mode when omitted)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the relay server (default when no subcommand is given)
    #[command(about = "Start the relay server")]
    Serve,

    /// Check that a configuration file decodes and report its contents
    #[command(about = "Validate a configuration file")]
    Check,
}
