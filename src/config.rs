//! Configuration document model and decoder
//!
//! The configuration file is a JSON array of objects. Each element is one of:
//! a comment (any object with a `comment` field, dropped during parsing), the
//! process-local settings (`port`, `configSamplePeriod`), or a remote tenant
//! (`tokenUri`, `clientId`, `clientSecret`, `redirectBackHosts`). The decoder
//! is pure; change detection and hot-reload live in [`crate::reload`].

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "build/config.json";

/// A secret value that never renders in logs or debug output.
///
/// The raw string is reachable only through [`Secret::expose`], which is
/// called at exactly one site (building the HTTP Basic header).
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a raw secret.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Keep the result out of logs and responses.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// One allow-listed redirect-back host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackHost {
    /// `host` or `host:port`, compared case-insensitively on the host part
    pub host: String,
    /// When `true`, the incoming `redirectBackUri` must use HTTPS
    pub ssl: bool,
}

impl BackHost {
    /// Parse one `redirectBackHosts` entry.
    ///
    /// `https://…` marks the host as TLS-required, `http://…` and bare
    /// `host[:port]` strings do not.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauth_relay::config::BackHost;
    ///
    /// let host = BackHost::parse("https://app.example.com:8443").unwrap();
    /// assert_eq!(host.host, "app.example.com:8443");
    /// assert!(host.ssl);
    ///
    /// let host = BackHost::parse("oauth-client-dev.local").unwrap();
    /// assert!(!host.ssl);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when a URL-shaped entry has no parseable authority.
    pub fn parse(entry: &str) -> Result<Self> {
        if entry.starts_with("https://") || entry.starts_with("http://") {
            let url = Url::parse(entry)
                .map_err(|e| Error::Config(format!("Bad redirectBack host '{entry}': {e}")))?;
            let host = url
                .host_str()
                .ok_or_else(|| Error::Config(format!("Bad redirectBack host '{entry}': no host")))?;
            let host = match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            Ok(Self {
                host,
                ssl: url.scheme() == "https",
            })
        } else {
            Ok(Self {
                host: entry.to_string(),
                ssl: false,
            })
        }
    }
}

/// One remote tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConfig {
    /// Absolute URL of the provider token endpoint
    pub token_uri: String,
    /// OAuth client identifier
    pub client_id: String,
    /// OAuth client secret, redacted everywhere except the token POST
    pub client_secret: Secret,
    /// Allow-list for `redirectBackUri` hosts
    pub redirect_back_hosts: Vec<BackHost>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalConfig {
    /// Listener port; zero or negative switches the listener off
    pub http_port: i64,
    /// Config poll period in seconds; zero disables polling
    pub config_sample_period: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            config_sample_period: 2,
        }
    }
}

/// A fully decoded configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDocument {
    /// Process-local settings (defaults when the document has no local element)
    pub local: LocalConfig,
    /// Remote tenants in document order
    pub tenants: Vec<TenantConfig>,
}

/// Wire shape of a tenant element. All four fields are required.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantWire {
    token_uri: String,
    client_id: String,
    client_secret: Secret,
    redirect_back_hosts: Vec<String>,
}

/// Wire shape of the local element. Each field defaults when absent.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LocalWire {
    port: Option<i64>,
    config_sample_period: Option<u64>,
}

const TENANT_KEYS: [&str; 4] = ["tokenUri", "clientId", "clientSecret", "redirectBackHosts"];

/// One classified element of the document. Comments are a parser artifact;
/// they never reach the registry.
enum ConfigEntry {
    Comment,
    Local(LocalConfig),
    Tenant(TenantConfig),
}

impl ConfigEntry {
    /// Classify one array element. A `comment` field wins regardless of what
    /// else the object carries; any tenant key requires all four; everything
    /// else must be a local element.
    fn classify(element: &serde_json::Value) -> Result<Self> {
        let Some(object) = element.as_object() else {
            return Err(Error::Config(format!(
                "Configuration element is not an object: {element}"
            )));
        };

        if object.contains_key("comment") {
            return Ok(Self::Comment);
        }

        if TENANT_KEYS.iter().any(|k| object.contains_key(*k)) {
            let wire: TenantWire = serde_json::from_value(element.clone())
                .map_err(|e| Error::Config(format!("Bad tenant element: {e}")))?;
            let redirect_back_hosts = wire
                .redirect_back_hosts
                .iter()
                .map(|h| BackHost::parse(h))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Tenant(TenantConfig {
                token_uri: wire.token_uri,
                client_id: wire.client_id,
                client_secret: wire.client_secret,
                redirect_back_hosts,
            }));
        }

        let wire: LocalWire = serde_json::from_value(element.clone())
            .map_err(|e| Error::Config(format!("Bad configuration element: {e}")))?;
        let defaults = LocalConfig::default();
        Ok(Self::Local(LocalConfig {
            http_port: wire.port.unwrap_or(defaults.http_port),
            config_sample_period: wire
                .config_sample_period
                .unwrap_or(defaults.config_sample_period),
        }))
    }
}

impl ConfigDocument {
    /// Decode a configuration document from raw file bytes.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, a tenant element missing any of its four
    /// fields, an unparseable `redirectBackHosts` entry, a second local
    /// element (`"Multiple local configurations"`), or an element that is
    /// neither comment, tenant, nor local.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let elements: Vec<serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|e| Error::Config(format!("Bad configuration JSON: {e}")))?;

        let mut local: Option<LocalConfig> = None;
        let mut tenants = Vec::new();

        for element in &elements {
            match ConfigEntry::classify(element)? {
                ConfigEntry::Comment => {}
                ConfigEntry::Tenant(tenant) => tenants.push(tenant),
                ConfigEntry::Local(settings) => {
                    if local.is_some() {
                        return Err(Error::Config("Multiple local configurations".to_string()));
                    }
                    local = Some(settings);
                }
            }
        }

        Ok(Self {
            local: local.unwrap_or_default(),
            tenants,
        })
    }
}
