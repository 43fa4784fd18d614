//! Listener lifecycle
//!
//! The HTTP listener is `Unbound` or `Bound(port)`. The manager reconciles
//! the bound state against the desired port published by the config loader:
//! rebinding to the same port is a no-op, a change drains the old listener
//! (in-flight requests complete) and only then binds the new port, and
//! `port <= 0` switches the listener off. A failed bind leaves the state
//! machine in `Unbound` to be retried on the next config change.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{error, info};

use crate::{Error, Result};

struct ActiveListener {
    port: u16,
    shutdown_tx: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

enum ListenerState {
    Unbound,
    Bound(ActiveListener),
}

/// Reconciling manager for the relay's single HTTP listener.
pub struct ListenerManager {
    host: String,
    app: Router,
    crash_on_bind: bool,
    state: ListenerState,
}

impl ListenerManager {
    /// Create an unbound manager serving `app` on `host`.
    #[must_use]
    pub fn new(host: String, app: Router, crash_on_bind: bool) -> Self {
        Self {
            host,
            app,
            crash_on_bind,
            state: ListenerState::Unbound,
        }
    }

    /// Port currently bound, when any.
    #[must_use]
    pub fn current_port(&self) -> Option<u16> {
        match &self.state {
            ListenerState::Bound(active) => Some(active.port),
            ListenerState::Unbound => None,
        }
    }

    /// Run the reconcile loop until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns a bind error only when `crash_on_bind` is set; otherwise bind
    /// failures are logged and retried on the next port change.
    pub async fn run(
        mut self,
        mut port_rx: watch::Receiver<i64>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            let desired = *port_rx.borrow_and_update();
            if let Err(e) = self.reconcile(desired).await {
                self.unbind().await;
                return Err(e);
            }

            tokio::select! {
                changed = port_rx.changed() => {
                    if changed.is_err() {
                        // Loader stopped (polling disabled); serve until shutdown.
                        let _ = shutdown.recv().await;
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        self.unbind().await;
        Ok(())
    }

    /// Drive the state machine toward `desired`.
    ///
    /// # Errors
    ///
    /// Propagates a bind failure when `crash_on_bind` is set.
    pub async fn reconcile(&mut self, desired: i64) -> Result<()> {
        if desired <= 0 {
            if self.current_port().is_some() {
                info!("Listener switched off (port <= 0)");
            }
            self.unbind().await;
            return Ok(());
        }

        let Ok(port) = u16::try_from(desired) else {
            error!(port = desired, "Listener port out of range");
            self.unbind().await;
            return Ok(());
        };

        if self.current_port() == Some(port) {
            return Ok(());
        }

        // Old listener must be fully released before the new bind.
        self.unbind().await;

        match self.bind(port).await {
            Ok(()) => Ok(()),
            Err(e) if self.crash_on_bind => Err(e),
            Err(e) => {
                error!(error = %e, "Bind failed, staying unbound until next config change");
                Ok(())
            }
        }
    }

    async fn bind(&mut self, port: u16) -> Result<()> {
        let addr: SocketAddr = format!("{}:{port}", self.host)
            .parse()
            .map_err(|e| Error::Bind {
                port,
                reason: format!("bad address: {e}"),
            })?;

        let listener = TcpListener::bind(addr).await.map_err(|e| Error::Bind {
            port,
            reason: e.to_string(),
        })?;

        info!(host = %self.host, port, "Listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = self.app.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Listener terminated abnormally");
            }
        });

        self.state = ListenerState::Bound(ActiveListener {
            port,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Gracefully drain and release the bound listener, when any.
    pub async fn unbind(&mut self) {
        if let ListenerState::Bound(active) =
            std::mem::replace(&mut self.state, ListenerState::Unbound)
        {
            let _ = active.shutdown_tx.send(());
            let _ = active.handle.await;
            info!(port = active.port, "Listener released");
        }
    }
}
