//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Health check
//!
//! # Shipping
//! POST   /api/shipping/rates              - Live rates, or the fallback table
//! GET    /api/shipping/fallback-rates     - Static rate table
//! POST   /api/shipping/validate-address   - Carrier address validation
//!
//! # Login guard
//! GET    /api/login-guard                 - Lockout status for this client
//! POST   /api/login-guard/failures        - Record a failed login
//! DELETE /api/login-guard/clients/{client} - Clear after a successful login
//!                                           (auth backend, bearer service token)
//! ```

pub mod login_guard;
pub mod shipping;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the shipping routes router.
pub fn shipping_routes() -> Router<AppState> {
    Router::new()
        .route("/rates", post(shipping::rates))
        .route("/fallback-rates", get(shipping::fallback_rates))
        .route("/validate-address", post(shipping::validate_address))
}

/// Create the login guard routes router.
pub fn login_guard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(login_guard::status))
        .route("/failures", post(login_guard::record_failure))
        .route("/clients/{client}", delete(login_guard::clear))
}

/// Everything under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/api/shipping", shipping_routes())
        .nest("/api/login-guard", login_guard_routes())
}

/// Build the complete router: health check plus the API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(api_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check the carrier.
pub async fn health() -> &'static str {
    "ok"
}
