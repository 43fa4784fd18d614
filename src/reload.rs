//! Config hot-reload
//!
//! The loader polls the configuration file at `configSamplePeriod` seconds,
//! short-circuits on byte-identical contents, and publishes each successful
//! decode as a fresh [`Snapshot`] behind [`LiveState`]. A failed read or
//! decode never disturbs the running registry. Port changes are forwarded to
//! the listener manager over a watch channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::{ConfigDocument, LocalConfig};
use crate::registry::TenantRegistry;
use crate::{Error, Result};

/// One configuration generation: the tenant index plus local settings.
///
/// Snapshots are immutable; request handlers clone the `Arc` once at dispatch
/// and keep it for the whole request, so credentials resolved at dispatch stay
/// stable even when a reload lands mid-exchange.
#[derive(Debug)]
pub struct Snapshot {
    /// Tenant index for this generation
    pub registry: TenantRegistry,
    /// Local settings for this generation
    pub local: LocalConfig,
}

impl Snapshot {
    /// Build a snapshot from a decoded document.
    #[must_use]
    pub fn from_document(doc: ConfigDocument) -> Self {
        Self {
            registry: TenantRegistry::build(doc.tenants),
            local: doc.local,
        }
    }
}

/// Live, atomically-swappable snapshot shared across the relay.
///
/// Readers take a read-lock and clone the inner `Arc`; the loader swaps the
/// whole `Arc` under a write-lock, so readers never observe a partial update.
///
/// # Examples
///
/// ```
/// use oauth_relay::config::ConfigDocument;
/// use oauth_relay::reload::{LiveState, Snapshot};
///
/// let doc = ConfigDocument::parse(br#"[{"port": 4000}]"#).unwrap();
/// let live = LiveState::new(Snapshot::from_document(doc));
/// assert_eq!(live.get().local.http_port, 4000);
/// ```
pub struct LiveState {
    inner: RwLock<Arc<Snapshot>>,
}

impl LiveState {
    /// Create a store seeded with the startup snapshot.
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Clone the current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.read())
    }

    /// Atomically replace the current snapshot.
    pub fn set(&self, snapshot: Snapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }
}

/// Read and decode a configuration file once, synchronously.
///
/// Used at startup and by the `check` subcommand.
///
/// # Errors
///
/// Fails when the file cannot be read or does not decode.
pub fn load_document(path: &std::path::Path) -> Result<ConfigDocument> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Config(format!("Can't read {}: {e}", path.display())))?;
    ConfigDocument::parse(&bytes)
}

/// Read-failure edge detector: the first failed read after a success logs a
/// notice, repeats stay silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Ok,
    Failed,
}

/// Periodic configuration poller.
pub struct ConfigLoader {
    path: PathBuf,
    live: Arc<LiveState>,
    rebind: watch::Sender<i64>,
    last_contents: Option<Vec<u8>>,
    read_state: ReadState,
}

impl ConfigLoader {
    /// Create a loader for `path`, publishing into `live` and sending port
    /// changes to `rebind`.
    #[must_use]
    pub fn new(path: PathBuf, live: Arc<LiveState>, rebind: watch::Sender<i64>) -> Self {
        Self {
            path,
            live,
            rebind,
            last_contents: None,
            read_state: ReadState::Ok,
        }
    }

    /// Run one poll cycle: read, compare, decode, publish.
    pub async fn poll_once(&mut self) {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                self.read_state = ReadState::Ok;
                bytes
            }
            Err(e) => {
                if self.read_state != ReadState::Failed {
                    warn!(path = %self.path.display(), error = %e,
                        "Config reload: read failed, keeping current configuration");
                    self.read_state = ReadState::Failed;
                }
                return;
            }
        };

        if self.last_contents.as_deref() == Some(bytes.as_slice()) {
            return;
        }

        match ConfigDocument::parse(&bytes) {
            Ok(doc) => {
                let old = self.live.get();
                let new_port = doc.local.http_port;
                let snapshot = Snapshot::from_document(doc);
                info!(
                    tenants = snapshot.registry.len(),
                    port = new_port,
                    "Config reload: applied"
                );
                self.live.set(snapshot);
                if new_port != old.local.http_port {
                    let _ = self.rebind.send(new_port);
                }
            }
            Err(e) => {
                warn!(error = %e, "Config reload: decode failed, keeping current configuration");
            }
        }

        // Remember the raw bytes either way so an unchanged file (or the same
        // broken file) triggers no further work.
        self.last_contents = Some(bytes);
    }

    /// Spawn the poll loop.
    ///
    /// The period is re-read from the live snapshot on every cycle, so a
    /// reload that changes `configSamplePeriod` takes effect on the next
    /// tick. A period of zero stops the loop; a read slower than the period
    /// simply delays the next read (one read at a time).
    pub fn spawn(mut self, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let period = self.live.get().local.config_sample_period;
                if period == 0 {
                    info!("Config polling disabled (configSamplePeriod = 0)");
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(period)) => {
                        self.poll_once().await;
                    }
                    _ = shutdown.recv() => {
                        debug!("Config loader shutting down");
                        break;
                    }
                }
            }
        })
    }
}
