//! Provider error-callback handler
//!
//! An authorization server reporting `?error=access_denied&state=…` never
//! carries a code, but the SPA still needs a usable answer. When the state
//! decodes to a valid envelope the error is forwarded as a fragment payload;
//! when it does not, the SPA is unreachable and a 400 is all that is left.

use axum::response::Response;
use tracing::debug;

use super::dispatch;
use super::exchange::redirect_with_fragment;
use crate::envelope::{RedirectEnvelope, ResponseTokenError};

/// Handle an error callback from the authorization server.
pub fn handle(error_value: &str, state_param: &str) -> Response {
    let Ok(envelope) = RedirectEnvelope::decode(state_param) else {
        return dispatch::bad_request();
    };

    let err = if error_value.is_empty() {
        "Missing code/state".to_string()
    } else {
        error_value.to_string()
    };

    debug!(client_id = %envelope.client_id, error = %err, "Forwarding provider error");

    let payload = ResponseTokenError {
        err,
        state: envelope.state,
    }
    .to_json();
    redirect_with_fragment(&envelope.redirect_back_uri, &payload)
}
