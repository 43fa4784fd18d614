//! Authorization-server simulator
//!
//! A self-contained fake provider living on the relay's own listener, used by
//! the integration tests. The authorize endpoint approves everything with the
//! fixed code `xyzzy`; the token endpoint grants `yourTokenSir` to any client
//! except the literal `client_id` `"fail"`.

use axum::Json;
use axum::extract::{Form, rejection::FormRejection};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// The authorization code every simulated consent produces.
pub const SIMULATOR_CODE: &str = "xyzzy";

/// Handle the simulator authorize endpoint: always approve, bounce the
/// browser straight back with the fixed code and the caller's state.
#[must_use]
pub fn authorize(client_id: &str, redirect_uri: &str, state: &str) -> Response {
    debug!(client_id, "Simulator authorize, approving");
    let state = utf8_percent_encode(state, NON_ALPHANUMERIC);
    let location = format!("{redirect_uri}?code={SIMULATOR_CODE}&state={state}");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Form body of the simulator token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    grant_type: Option<String>,
    code: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Handle the simulator token endpoint (POST /).
///
/// Credentials are accepted either in the form body or as HTTP Basic.
pub async fn token(
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return invalid_request("body is not a form");
    };

    let (client_id, _client_secret) = match credentials(&headers, &form) {
        Some(credentials) => credentials,
        None => return invalid_request("missing client credentials"),
    };

    if form.grant_type.as_deref() != Some("authorization_code") {
        return invalid_request("grant_type must be authorization_code");
    }

    if form.code.as_deref().unwrap_or_default().is_empty() {
        return invalid_request("code is required");
    }

    if client_id == "fail" {
        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed."
            }),
        );
    }

    json_response(
        StatusCode::OK,
        json!({
            "access_token": "yourTokenSir",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "aRefreshToken"
        }),
    )
}

/// Extract `(client_id, client_secret)` from the form body or, failing that,
/// from an HTTP Basic `Authorization` header.
fn credentials(headers: &HeaderMap, form: &TokenForm) -> Option<(String, String)> {
    if let Some(client_id) = &form.client_id {
        return Some((
            client_id.clone(),
            form.client_secret.clone().unwrap_or_default(),
        ));
    }

    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}

fn invalid_request(reason: &str) -> Response {
    json_response(
        StatusCode::BAD_REQUEST,
        json!({
            "error": "invalid_request",
            "error_description": reason
        }),
    )
}

/// JSON response with the token-endpoint cache headers.
fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}
