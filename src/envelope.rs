//! State envelope and token response codecs
//!
//! The relay round-trips caller context through the authorization server as a
//! JSON envelope packed into the OAuth `state` parameter, and delivers the
//! outcome of the code exchange back to the SPA as a JSON payload in the URL
//! fragment. Both directions use standard padded base64 over compact JSON.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller round-trip payload embedded in the OAuth `state` parameter.
///
/// Every field except `state` is required; `state` is the caller's own opaque
/// value and is carried through unchanged (absent and JSON `null` are
/// equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RedirectEnvelope {
    /// OAuth client identifier of the tenant
    pub client_id: String,
    /// Absolute URL of the tenant's token endpoint
    pub token_uri: String,
    /// Absolute URL of the relay's redirect endpoint
    pub redirect_uri: String,
    /// Requested scopes, possibly empty
    pub scope: Vec<String>,
    /// Absolute URL the browser is sent back to after the exchange
    pub redirect_back_uri: String,
    /// Opaque caller state, echoed into the response payload
    #[serde(default)]
    pub state: Option<String>,
}

/// Failure modes of [`RedirectEnvelope::decode`].
///
/// The two stages are kept apart because the HTTP layer reports them with
/// different messages.
#[derive(Error, Debug)]
pub enum EnvelopeDecodeError {
    /// The `state` value was not valid base64.
    #[error("not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The base64 payload did not decode to a well-formed envelope.
    #[error("malformed envelope: {source}")]
    Json {
        /// Lossy text of the decoded payload, for the 400 body
        decoded: String,
        /// Underlying serde failure
        source: serde_json::Error,
    },
}

impl RedirectEnvelope {
    /// Encode as compact JSON packed into standard padded base64.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauth_relay::envelope::RedirectEnvelope;
    ///
    /// let envelope = RedirectEnvelope {
    ///     client_id: "cid".to_string(),
    ///     token_uri: "https://p/t".to_string(),
    ///     redirect_uri: "https://s/cb".to_string(),
    ///     scope: vec!["r".to_string()],
    ///     redirect_back_uri: "https://x.test/app".to_string(),
    ///     state: Some("u".to_string()),
    /// };
    /// let decoded = RedirectEnvelope::decode(&envelope.encode()).unwrap();
    /// assert_eq!(decoded, envelope);
    /// ```
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decode the inverse of [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeDecodeError::Base64`] when the input is not base64,
    /// and [`EnvelopeDecodeError::Json`] (carrying the decoded text) when the
    /// payload is not a valid envelope. Unknown JSON fields are rejected.
    pub fn decode(encoded: &str) -> Result<Self, EnvelopeDecodeError> {
        let bytes = STANDARD.decode(encoded)?;
        serde_json::from_slice(&bytes).map_err(|source| EnvelopeDecodeError::Json {
            decoded: String::from_utf8_lossy(&bytes).into_owned(),
            source,
        })
    }
}

/// Success payload delivered back to the SPA.
///
/// The access token is a bearer token; the `token_type` wire field is implied
/// by construction and always serialized as `"bearer"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseToken {
    /// Bearer access token
    pub token: String,
    /// Optional bearer refresh token
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds, when the provider reports one
    pub expires_in: Option<u64>,
    /// Granted scopes, possibly empty
    pub scope: Vec<String>,
    /// Opaque caller state from the envelope
    pub state: Option<String>,
}

/// Failure payload delivered back to the SPA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTokenError {
    /// Reason the exchange failed, never empty
    pub err: String,
    /// Opaque caller state from the envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Failure modes of [`ResponseToken::from_json`].
#[derive(Error, Debug)]
pub enum ResponseDecodeError {
    /// The body was not the OAuth 2.0 token-response JSON shape.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// `token_type` was present but not (any casing of) `bearer`.
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),
}

/// On-wire shape of the OAuth 2.0 token response.
///
/// `scope` is either a JSON array of strings or a comma-separated string (the
/// GitHub non-conformance); both canonicalise to an array. Unknown fields are
/// tolerated since providers attach extras freely.
#[derive(Serialize, Deserialize)]
struct ResponseTokenWire {
    access_token: String,
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<ScopeWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ScopeWire {
    List(Vec<String>),
    Csv(String),
}

impl ScopeWire {
    fn canonicalise(self) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::Csv(s) if s.is_empty() => Vec::new(),
            Self::Csv(s) => s.split(',').map(str::to_string).collect(),
        }
    }
}

impl ResponseToken {
    /// Emit the OAuth 2.0 token-response JSON, `token_type` always lowercase.
    #[must_use]
    pub fn to_json(&self) -> String {
        let wire = ResponseTokenWire {
            access_token: self.token.clone(),
            token_type: "bearer".to_string(),
            refresh_token: self.refresh_token.clone(),
            expires_in: self.expires_in,
            scope: Some(ScopeWire::List(self.scope.clone())),
            state: self.state.clone(),
        };
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Decode an OAuth 2.0 token response.
    ///
    /// Accepts `token_type` in any casing and `scope` as an array or a
    /// comma-separated string; a missing scope canonicalises to empty.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or a non-bearer `token_type`.
    pub fn from_json(body: &[u8]) -> Result<Self, ResponseDecodeError> {
        let wire: ResponseTokenWire = serde_json::from_slice(body)?;
        if !wire.token_type.eq_ignore_ascii_case("bearer") {
            return Err(ResponseDecodeError::UnsupportedTokenType(wire.token_type));
        }
        Ok(Self {
            token: wire.access_token,
            refresh_token: wire.refresh_token,
            expires_in: wire.expires_in,
            scope: wire.scope.map(ScopeWire::canonicalise).unwrap_or_default(),
            state: wire.state,
        })
    }
}

impl ResponseTokenError {
    /// Emit the `{err, state}` failure JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode the inverse of [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Base64-encode a payload for the `#fragment` of the redirect-back URL.
#[must_use]
pub fn fragment_payload(json: &str) -> String {
    STANDARD.encode(json)
}
