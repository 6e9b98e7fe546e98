//! Login attempt guard endpoints.
//!
//! The storefront's login form calls `status` and `record_failure` around
//! each sign-in attempt; clients are identified by IP (see [`ClientKey`]).
//! Clearing is reserved for the auth backend, which knows when a login
//! actually succeeded and names the client explicitly.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::login_guard::GuardStatus;
use crate::middleware::ClientKey;
use crate::state::AppState;

/// Current lockout status for the calling client.
#[instrument(skip(state))]
pub async fn status(State(state): State<AppState>, client: ClientKey) -> Json<GuardStatus> {
    Json(state.login_guards().check_status(client.as_str()))
}

/// Record a failed login for the calling client.
#[instrument(skip(state))]
pub async fn record_failure(
    State(state): State<AppState>,
    client: ClientKey,
) -> Json<GuardStatus> {
    let status = state.login_guards().record_failure(client.as_str());
    if status.is_locked {
        tracing::info!(client = client.as_str(), "client locked out of login");
    }
    Json(status)
}

/// Clear a client's history after the auth backend saw it sign in.
///
/// Requires `Authorization: Bearer <LOGIN_GUARD_CLEAR_TOKEN>`. With no token
/// configured every request is refused and lockouts only expire.
#[instrument(skip(state, headers))]
pub async fn clear(
    State(state): State<AppState>,
    Path(client): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let authorized = state
        .config()
        .login_guard_clear_token
        .as_ref()
        .zip(bearer_token(&headers))
        .is_some_and(|(expected, presented)| {
            constant_time_compare(expected.expose_secret(), presented)
        });

    if !authorized {
        tracing::warn!(client = %client, "refused login guard clear without a valid service token");
        return Err(AppError::Unauthorized);
    }

    state.login_guards().clear(&client);
    Ok(StatusCode::NO_CONTENT)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
