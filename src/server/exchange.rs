//! Token-exchange handler
//!
//! Decodes the round-tripped envelope, resolves the tenant, authorizes the
//! redirect-back host, POSTs the code to the provider token endpoint, and
//! 302-redirects the browser to `redirectBackUri#<base64(payload)>`. Once a
//! valid envelope has been decoded the SPA always receives a fragment-encoded
//! outcome; the payload carries bearer credentials and is never logged.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::dispatch::AppState;
use crate::config::TenantConfig;
use crate::envelope::{
    EnvelopeDecodeError, RedirectEnvelope, ResponseToken, ResponseTokenError, fragment_payload,
};
use crate::registry::authorize_back_host;

/// Handle a code-bearing provider redirect.
pub async fn handle(app: &AppState, code: &str, state_param: &str) -> Response {
    let snapshot = app.live.get();

    let envelope = match RedirectEnvelope::decode(state_param) {
        Ok(envelope) => envelope,
        Err(EnvelopeDecodeError::Base64(_)) => {
            return plain(
                StatusCode::BAD_REQUEST,
                format!("State not base64 encoded: {state_param}"),
            );
        }
        Err(EnvelopeDecodeError::Json { decoded, .. }) => {
            return plain(StatusCode::BAD_REQUEST, format!("Malformed state: {decoded}"));
        }
    };

    let Ok(back_url) = Url::parse(&envelope.redirect_back_uri) else {
        return plain(
            StatusCode::BAD_REQUEST,
            format!("Can't parse redirectBackUri: {}", envelope.redirect_back_uri),
        );
    };

    let Some(tenant) = snapshot
        .registry
        .lookup(&envelope.client_id, &envelope.token_uri)
    else {
        let reason = format!(
            "Unknown (clientId, tokenUri): ({}, {})",
            envelope.client_id, envelope.token_uri
        );
        warn!("{reason}");
        return plain(StatusCode::NOT_FOUND, reason);
    };

    if let Err(policy) = authorize_back_host(tenant, &back_url) {
        let reason = policy.to_string();
        warn!(client_id = %envelope.client_id, "{reason}");
        return plain(StatusCode::NOT_FOUND, reason);
    }

    if Url::parse(&envelope.redirect_uri).is_err() || Url::parse(&envelope.token_uri).is_err() {
        warn!(client_id = %envelope.client_id, "Can't parse redirectUri or tokenUri");
        return plain(StatusCode::NOT_FOUND, "Can't parse redirectUri or tokenUri");
    }

    debug!(client_id = %envelope.client_id, token_uri = %envelope.token_uri, "Exchanging code");

    let request = build_token_request(&app.http, tenant, &envelope, code);
    let envelope_scope = envelope.scope.clone();
    let envelope_state = envelope.state.clone();

    // Detached so a dropped browser connection lets the POST run to
    // completion; the join handle discards the result in that case.
    let outcome = tokio::spawn(send_token_request(request, envelope_scope, envelope_state));

    let payload = match outcome.await {
        Ok(Ok(token)) => token.to_json(),
        Ok(Err(err)) => ResponseTokenError {
            err,
            state: envelope.state.clone(),
        }
        .to_json(),
        Err(_) => ResponseTokenError {
            err: "NetworkError".to_string(),
            state: envelope.state.clone(),
        }
        .to_json(),
    };

    redirect_with_fragment(&envelope.redirect_back_uri, &payload)
}

/// Form pairs of the token POST: `client_id` rides in the body only when no
/// secret exists to send via HTTP Basic.
fn token_request_form(
    tenant: &TenantConfig,
    envelope: &RedirectEnvelope,
    code: &str,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
    ];
    if tenant.client_secret.is_empty() {
        form.push(("client_id", tenant.client_id.clone()));
    }
    form.push(("redirect_uri", envelope.redirect_uri.clone()));
    form
}

/// Assemble the outbound token POST.
///
/// `Accept: application/json` is required for GitHub, which otherwise
/// answers with a URL-encoded body; other providers ignore it.
fn build_token_request(
    http: &reqwest::Client,
    tenant: &TenantConfig,
    envelope: &RedirectEnvelope,
    code: &str,
) -> reqwest::RequestBuilder {
    let mut request = http
        .post(&tenant.token_uri)
        .header(header::ACCEPT, "application/json")
        .form(&token_request_form(tenant, envelope, code));
    if !tenant.client_secret.is_empty() {
        request = request.basic_auth(&tenant.client_id, Some(tenant.client_secret.expose()));
    }
    request
}

/// Send the POST and map the provider's answer to a token or an error string
/// for the fragment payload.
async fn send_token_request(
    request: reqwest::RequestBuilder,
    envelope_scope: Vec<String>,
    envelope_state: Option<String>,
) -> Result<ResponseToken, String> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return Err(transport_error(&e)),
    };

    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => return Err(transport_error(&e)),
    };

    if status.is_success() {
        match ResponseToken::from_json(&body) {
            Ok(token) => Ok(finish_token(token, envelope_scope, envelope_state)),
            Err(e) => Err(format!("Decoder error: {e}")),
        }
    } else {
        Err(provider_error(status, &body))
    }
}

/// Substitute the envelope scope when the provider granted none, and stamp
/// the caller's state onto the payload.
fn finish_token(
    mut token: ResponseToken,
    envelope_scope: Vec<String>,
    envelope_state: Option<String>,
) -> ResponseToken {
    if token.scope.is_empty() {
        token.scope = envelope_scope;
    }
    token.state = envelope_state;
    token
}

/// Error string for a non-2xx provider answer: `error_description`, then the
/// `error` code, then the bare status. Empty strings fall through so the
/// payload's `err` field is never empty.
fn provider_error(status: StatusCode, body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorWire {
        error: Option<String>,
        error_description: Option<String>,
    }

    if let Ok(wire) = serde_json::from_slice::<ErrorWire>(body) {
        if let Some(description) = wire.error_description.filter(|d| !d.is_empty()) {
            return description;
        }
        if let Some(code) = wire.error.filter(|c| !c.is_empty()) {
            return code;
        }
    }
    format!("BadStatus, code: {}", status.as_u16())
}

/// Error string for a failed transport.
fn transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Timeout".to_string()
    } else if e.is_builder() {
        match e.url() {
            Some(url) => format!("BadUrl: {url}"),
            None => "BadUrl: invalid token URI".to_string(),
        }
    } else {
        "NetworkError".to_string()
    }
}

fn plain(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

/// 302 to `redirect_back_uri#<base64(payload)>`.
pub(super) fn redirect_with_fragment(redirect_back_uri: &str, payload_json: &str) -> Response {
    let location = format!("{redirect_back_uri}#{}", fragment_payload(payload_json));
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
