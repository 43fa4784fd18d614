//! Request classification and the root HTTP handler
//!
//! Everything arrives on one endpoint; the query string decides whether a
//! request is a provider redirect carrying a code, a provider error callback,
//! or a simulator call. Classification is pure and looks only at the query
//! keys it knows about.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use percent_encoding::percent_decode_str;
use tower_http::trace::TraceLayer;

use super::{errors, exchange};
use crate::reload::LiveState;
use crate::simulator;

/// Response body for requests that match no dispatch rule.
pub const BAD_REQUEST_BODY: &str = "Bad request, missing code/state";

/// Shared application state
pub struct AppState {
    /// Live config snapshot store
    pub live: Arc<LiveState>,
    /// Shared outbound HTTP client (30 s timeout)
    pub http: reqwest::Client,
}

/// Decoded query parameters, first occurrence of each key.
///
/// This is a bespoke parser rather than `form_urlencoded` because OAuth
/// `state` values are standard base64: a literal `+` must stay a `+`, not
/// become a space, and trailing `=` padding must survive whether it arrives
/// raw or as `%3D`.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    /// Parse a raw query string (without the leading `?`).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut map = HashMap::new();
        for pair in raw.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = percent_decode_str(key).decode_utf8_lossy().into_owned();
            let value = percent_decode_str(value).decode_utf8_lossy().into_owned();
            map.entry(key).or_insert(value);
        }
        Self(map)
    }

    /// Value for `key`, when present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// The four request classes of the redirect endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Provider redirect carrying an authorization code
    Exchange {
        /// `code` query value
        code: String,
        /// `state` query value (base64 envelope)
        state: String,
    },
    /// Browser hitting the simulator's authorize endpoint
    SimulatorAuthorize {
        /// `client_id` query value
        client_id: String,
        /// `redirect_uri` query value
        redirect_uri: String,
        /// `state` query value, echoed back verbatim
        state: String,
    },
    /// Provider error callback
    ErrorCallback {
        /// `error` query value
        error: String,
        /// `state` query value (base64 envelope)
        state: String,
    },
    /// Nothing matched
    BadRequest,
}

/// Classify a GET request by its query parameters. Extra keys are ignored;
/// the rules are checked in order, so a code-bearing request wins even when
/// simulator keys are also present.
#[must_use]
pub fn classify(query: &QueryParams) -> RequestKind {
    if let (Some(code), Some(state)) = (query.get("code"), query.get("state")) {
        return RequestKind::Exchange {
            code: code.to_string(),
            state: state.to_string(),
        };
    }
    if let (Some(client_id), Some(redirect_uri), Some(state)) = (
        query.get("client_id"),
        query.get("redirect_uri"),
        query.get("state"),
    ) {
        return RequestKind::SimulatorAuthorize {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            state: state.to_string(),
        };
    }
    if let (Some(error), Some(state)) = (query.get("error"), query.get("state")) {
        return RequestKind::ErrorCallback {
            error: error.to_string(),
            state: state.to_string(),
        };
    }
    RequestKind::BadRequest
}

/// Create the relay router: one root endpoint, everything else 400s.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_get).post(simulator::token))
        .fallback(|| async { bad_request() })
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Classify an incoming GET and dispatch it.
async fn root_get(State(state): State<Arc<AppState>>, RawQuery(raw): RawQuery) -> Response {
    let query = QueryParams::parse(raw.as_deref().unwrap_or(""));
    match classify(&query) {
        RequestKind::Exchange { code, state: envelope } => {
            exchange::handle(&state, &code, &envelope).await
        }
        RequestKind::SimulatorAuthorize {
            client_id,
            redirect_uri,
            state: sim_state,
        } => simulator::authorize(&client_id, &redirect_uri, &sim_state),
        RequestKind::ErrorCallback { error, state: envelope } => {
            errors::handle(&error, &envelope)
        }
        RequestKind::BadRequest => bad_request(),
    }
}

/// 400 with the canonical missing-code/state body.
#[must_use]
pub fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, BAD_REQUEST_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: &str) -> RequestKind {
        classify(&QueryParams::parse(raw))
    }

    // =========================================================================
    // Query parsing
    // =========================================================================

    #[test]
    fn parses_simple_pairs() {
        let q = QueryParams::parse("code=C&state=S");
        assert_eq!(q.get("code"), Some("C"));
        assert_eq!(q.get("state"), Some("S"));
    }

    #[test]
    fn empty_query_has_no_keys() {
        let q = QueryParams::parse("");
        assert_eq!(q.get("code"), None);
    }

    #[test]
    fn value_keeps_embedded_equals_signs() {
        // base64 padding arrives as a literal '='
        let q = QueryParams::parse("state=abc==");
        assert_eq!(q.get("state"), Some("abc=="));
    }

    #[test]
    fn value_decodes_percent_encoded_padding() {
        let q = QueryParams::parse("state=abc%3D%3D");
        assert_eq!(q.get("state"), Some("abc=="));
    }

    #[test]
    fn plus_stays_a_plus() {
        // standard base64 alphabet includes '+'; it must not become a space
        let q = QueryParams::parse("state=a%2Bb&other=c+d");
        assert_eq!(q.get("state"), Some("a+b"));
        assert_eq!(q.get("other"), Some("c+d"));
    }

    #[test]
    fn key_without_value_is_empty_string() {
        let q = QueryParams::parse("error&state=S");
        assert_eq!(q.get("error"), Some(""));
    }

    #[test]
    fn first_occurrence_wins() {
        let q = QueryParams::parse("code=first&code=second");
        assert_eq!(q.get("code"), Some("first"));
    }

    #[test]
    fn keys_are_percent_decoded() {
        let q = QueryParams::parse("c%6Fde=C&state=S");
        assert_eq!(q.get("code"), Some("C"));
    }

    #[test]
    fn stray_ampersands_are_ignored() {
        let q = QueryParams::parse("&&code=C&&state=S&");
        assert_eq!(q.get("code"), Some("C"));
        assert_eq!(q.get("state"), Some("S"));
    }

    #[test]
    fn unicode_percent_sequences_decode() {
        let q = QueryParams::parse("state=%C3%BC");
        assert_eq!(q.get("state"), Some("ü"));
    }

    #[test]
    fn invalid_percent_sequences_pass_through() {
        // A dangling '%' is kept verbatim rather than dropped
        let q = QueryParams::parse("state=abc%");
        assert_eq!(q.get("state"), Some("abc%"));
    }

    #[test]
    fn full_base64_alphabet_survives_a_query_trip() {
        // Everything a standard base64 state can contain, in both raw and
        // percent-encoded form
        let q = QueryParams::parse("a=AZaz09%2B/w%3D%3D&b=AZaz09+/w==");
        assert_eq!(q.get("a"), Some("AZaz09+/w=="));
        assert_eq!(q.get("b"), Some("AZaz09+/w=="));
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn code_and_state_is_exchange() {
        assert_eq!(
            kind("code=C&state=S"),
            RequestKind::Exchange {
                code: "C".to_string(),
                state: "S".to_string()
            }
        );
    }

    #[test]
    fn simulator_authorize_triple() {
        assert_eq!(
            kind("client_id=c&redirect_uri=https%3A%2F%2Fs%2Fcb&state=S"),
            RequestKind::SimulatorAuthorize {
                client_id: "c".to_string(),
                redirect_uri: "https://s/cb".to_string(),
                state: "S".to_string()
            }
        );
    }

    #[test]
    fn error_and_state_is_error_callback() {
        assert_eq!(
            kind("error=access_denied&state=S"),
            RequestKind::ErrorCallback {
                error: "access_denied".to_string(),
                state: "S".to_string()
            }
        );
    }

    #[test]
    fn exchange_wins_over_simulator_authorize() {
        // code+state present alongside the simulator triple
        let k = kind("code=C&state=S&client_id=c&redirect_uri=r");
        assert!(matches!(k, RequestKind::Exchange { .. }));
    }

    #[test]
    fn simulator_authorize_wins_over_error() {
        let k = kind("client_id=c&redirect_uri=r&state=S&error=x");
        assert!(matches!(k, RequestKind::SimulatorAuthorize { .. }));
    }

    #[test]
    fn extra_keys_are_ignored() {
        let k = kind("code=C&state=S&utm_source=mail");
        assert!(matches!(k, RequestKind::Exchange { .. }));
    }

    #[test]
    fn missing_state_is_bad_request() {
        assert_eq!(kind("code=C"), RequestKind::BadRequest);
        assert_eq!(kind("error=x"), RequestKind::BadRequest);
        assert_eq!(kind(""), RequestKind::BadRequest);
    }

    #[test]
    fn client_id_without_redirect_uri_is_bad_request() {
        assert_eq!(kind("client_id=c&state=S"), RequestKind::BadRequest);
    }

    #[test]
    fn empty_values_still_classify_by_key_presence() {
        // Value emptiness is the handler's concern, not the classifier's
        assert!(matches!(kind("code=&state="), RequestKind::Exchange { .. }));
        assert!(matches!(
            kind("error=&state=S"),
            RequestKind::ErrorCallback { .. }
        ));
    }

    #[test]
    fn classification_grid() {
        // One row per key combination; expected discriminant for each
        let cases: [(&str, &str); 12] = [
            ("code=C&state=S", "exchange"),
            ("state=S&code=C", "exchange"),
            ("code=C&state=S&error=x", "exchange"),
            ("code=C&state=S&client_id=c&redirect_uri=r&error=x", "exchange"),
            ("client_id=c&redirect_uri=r&state=S", "authorize"),
            ("client_id=c&redirect_uri=r&state=S&error=x", "authorize"),
            ("error=x&state=S", "error"),
            ("error=x&state=S&client_id=c", "error"),
            ("code=C", "bad"),
            ("state=S", "bad"),
            ("client_id=c&redirect_uri=r", "bad"),
            ("error=x", "bad"),
        ];
        for (query, expected) in cases {
            let got = match kind(query) {
                RequestKind::Exchange { .. } => "exchange",
                RequestKind::SimulatorAuthorize { .. } => "authorize",
                RequestKind::ErrorCallback { .. } => "error",
                RequestKind::BadRequest => "bad",
            };
            assert_eq!(got, expected, "query: {query}");
        }
    }
}
