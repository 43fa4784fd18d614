//! Relay server
//!
//! Wires the live configuration store, the polling loader, the dispatch
//! router, and the listener manager into one runnable unit.

pub mod dispatch;
pub mod errors;
pub mod exchange;
pub mod listener;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::Result;
use crate::config::ConfigDocument;
use crate::reload::{ConfigLoader, LiveState, Snapshot, load_document};
use self::dispatch::{AppState, create_router};
use self::listener::ListenerManager;

/// Timeout for the outbound token POST.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup options for [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Configuration file to load and poll
    pub config_path: PathBuf,
    /// Address the listener binds on
    pub host: String,
    /// Listener port override (beats the config document at startup)
    pub port_override: Option<i64>,
    /// Exit instead of staying unbound when a bind fails
    pub crash_on_bind: bool,
}

/// The relay server.
pub struct Relay {
    live: Arc<LiveState>,
    options: RelayOptions,
}

impl Relay {
    /// Load the initial configuration and prepare the relay.
    ///
    /// A missing or broken config file is not fatal: the relay starts with an
    /// empty registry and picks up the file once the poller can decode it.
    #[must_use]
    pub fn new(options: RelayOptions) -> Self {
        let mut doc = match load_document(&options.config_path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Starting with empty configuration");
                ConfigDocument::default()
            }
        };
        if let Some(port) = options.port_override {
            doc.local.http_port = port;
        }
        let live = Arc::new(LiveState::new(Snapshot::from_document(doc)));
        Self { live, options }
    }

    /// Handle to the live snapshot store.
    #[must_use]
    pub fn live(&self) -> Arc<LiveState> {
        Arc::clone(&self.live)
    }

    /// Run until ctrl-c or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails on HTTP client construction or, with `crash_on_bind`, on a bind
    /// failure.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(shutdown_signal(shutdown_tx.clone()));
        self.run_until(shutdown_tx).await
    }

    /// Run until `shutdown_tx` fires. Exposed separately so tests can drive
    /// the lifecycle without signals.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_until(self, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
        let snapshot = self.live.get();
        info!(
            tenants = snapshot.registry.len(),
            port = snapshot.local.http_port,
            config = %self.options.config_path.display(),
            "Starting oauth-relay"
        );

        let (port_tx, port_rx) = watch::channel(snapshot.local.http_port);
        let loader = ConfigLoader::new(
            self.options.config_path.clone(),
            Arc::clone(&self.live),
            port_tx,
        );
        let loader_handle = loader.spawn(shutdown_tx.subscribe());

        let http = reqwest::Client::builder().timeout(PROVIDER_TIMEOUT).build()?;
        let state = Arc::new(AppState {
            live: Arc::clone(&self.live),
            http,
        });

        let manager = ListenerManager::new(
            self.options.host.clone(),
            create_router(state),
            self.options.crash_on_bind,
        );
        let result = manager.run(port_rx, shutdown_tx.subscribe()).await;

        loader_handle.abort();
        info!("Relay shutdown complete");
        result
    }
}

/// Resolve on ctrl-c or SIGTERM and fan the shutdown out.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
