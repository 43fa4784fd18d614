//! Tenant registry
//!
//! An immutable `(clientId, tokenUri) → tenant` index rebuilt wholesale on
//! every successful config reload, plus the redirect-back host policy check.

use std::collections::HashMap;
use std::fmt;

use url::Url;

use crate::config::TenantConfig;

/// Immutable tenant index for one configuration generation.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    tenants: HashMap<(String, String), TenantConfig>,
}

/// Host-policy rejection for a `redirectBackUri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPolicyError {
    /// The URL's host is not on the tenant's allow-list.
    UnknownHost(String),
    /// The host is allow-listed with `ssl=true` but the URL is not HTTPS.
    HttpsRequired(String),
}

impl fmt::Display for HostPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHost(host) => write!(f, "Unknown redirectBack host: {host}"),
            Self::HttpsRequired(host) => {
                write!(f, "https protocol required for redirect host: {host}")
            }
        }
    }
}

impl TenantRegistry {
    /// Fold tenants into the index. On a `(clientId, tokenUri)` collision the
    /// later document entry wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauth_relay::config::{Secret, TenantConfig};
    /// use oauth_relay::registry::TenantRegistry;
    ///
    /// let registry = TenantRegistry::build(vec![TenantConfig {
    ///     token_uri: "https://p/t".to_string(),
    ///     client_id: "cid".to_string(),
    ///     client_secret: Secret::new("sec"),
    ///     redirect_back_hosts: Vec::new(),
    /// }]);
    /// assert!(registry.lookup("cid", "https://p/t").is_some());
    /// assert!(registry.lookup("cid", "https://q/t").is_none());
    /// ```
    #[must_use]
    pub fn build(tenants: Vec<TenantConfig>) -> Self {
        let mut map = HashMap::with_capacity(tenants.len());
        for tenant in tenants {
            map.insert((tenant.client_id.clone(), tenant.token_uri.clone()), tenant);
        }
        Self { tenants: map }
    }

    /// Look up the tenant registered for `(client_id, token_uri)`.
    #[must_use]
    pub fn lookup(&self, client_id: &str, token_uri: &str) -> Option<&TenantConfig> {
        self.tenants
            .get(&(client_id.to_string(), token_uri.to_string()))
    }

    /// Number of registered tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether the registry has no tenants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

/// Check a `redirectBackUri` against a tenant's host allow-list.
///
/// Matching is exact on `host[:port]` (explicit ports only), case-insensitive
/// on the host. An allow-list entry with `ssl=true` additionally requires the
/// URL scheme to be `https`.
///
/// # Errors
///
/// Returns the policy violation; the caller surfaces it as a 404 and logs the
/// reason.
pub fn authorize_back_host(tenant: &TenantConfig, url: &Url) -> Result<(), HostPolicyError> {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(HostPolicyError::UnknownHost(url.to_string())),
    };

    let entry = tenant
        .redirect_back_hosts
        .iter()
        .find(|h| h.host.eq_ignore_ascii_case(&host))
        .ok_or_else(|| HostPolicyError::UnknownHost(host.clone()))?;

    if entry.ssl && url.scheme() != "https" {
        return Err(HostPolicyError::HttpsRequired(host));
    }
    Ok(())
}
