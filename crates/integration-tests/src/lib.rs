//! Integration test support for the Ao Dai Boutique storefront.
//!
//! [`FakeCarrier`] serves the carrier's token, pricing, and address endpoints
//! on an ephemeral local port so the estimator and the HTTP API can be
//! exercised end to end without network access.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p aodai-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aodai_core::{ManualClock, Parcel, ZipCode};
use aodai_storefront::config::{
    CarrierConfig, ShippingConfig, StorefrontConfig, default_fallback_rates,
};
use aodai_storefront::login_guard::LockoutPolicy;
use aodai_storefront::middleware::ProxyTrust;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Service token the auth backend presents to clear a login guard.
pub const TEST_CLEAR_TOKEN: &str = "Zt4r9QmX2vLp8KwN";

/// Bearer token the fake carrier issues and expects.
pub const FAKE_ACCESS_TOKEN: &str = "fake-access-token";

/// Client secret used by test configs. High enough entropy to pass config
/// validation if ever loaded from the environment.
pub const TEST_CLIENT_SECRET: &str = "k8Qz2mW7pL4xN9vR";

/// How the fake carrier answers.
#[derive(Debug, Clone)]
pub struct CarrierBehavior {
    /// Status for the token endpoint; anything but 200 is a rejection.
    pub token_status: StatusCode,
    pub token_expires_in: i64,
    /// Raw 200 body for the token endpoint, replacing the normal token JSON.
    pub token_body: Option<&'static str>,
    /// Status for the pricing endpoint.
    pub rate_status: StatusCode,
    /// `totalBasePrice` per mail class.
    pub prices: HashMap<String, f64>,
    /// Raw 200 body for the pricing endpoint, replacing the priced JSON.
    pub rate_body: Option<&'static str>,
    /// Status and body for the address endpoint.
    pub address_status: StatusCode,
    pub address_body: Value,
    /// Delay before answering price requests.
    pub rate_delay: Duration,
}

impl Default for CarrierBehavior {
    fn default() -> Self {
        let prices = [
            ("USPS_GROUND_ADVANTAGE", 8.45),
            ("PRIORITY_MAIL", 12.1),
            ("PRIORITY_MAIL_EXPRESS", 38.55),
        ]
        .into_iter()
        .map(|(class, price)| (class.to_string(), price))
        .collect();

        Self {
            token_status: StatusCode::OK,
            token_expires_in: 3600,
            token_body: None,
            rate_status: StatusCode::OK,
            prices,
            rate_body: None,
            address_status: StatusCode::OK,
            address_body: json!({
                "address": {
                    "streetAddress": "2855 STEVENS CREEK BLVD",
                    "city": "SANTA CLARA",
                    "state": "CA",
                    "ZIPCode": "95050",
                    "ZIPPlus4": "2803"
                },
                "additionalInfo": { "DPVConfirmation": "Y" }
            }),
            rate_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct Recorded {
    token_requests: AtomicUsize,
    rate_requests: AtomicUsize,
    address_requests: AtomicUsize,
    rate_bodies: Mutex<Vec<Value>>,
    address_queries: Mutex<Vec<HashMap<String, String>>>,
}

struct FakeState {
    behavior: Mutex<CarrierBehavior>,
    recorded: Recorded,
}

impl FakeState {
    fn behavior(&self) -> CarrierBehavior {
        self.behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Local stand-in for the carrier API.
pub struct FakeCarrier {
    base_url: Url,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeCarrier {
    /// Start a fake carrier with default behavior.
    pub async fn start() -> Self {
        Self::with_behavior(CarrierBehavior::default()).await
    }

    /// Start a fake carrier with the given behavior.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    #[allow(clippy::unwrap_used)]
    pub async fn with_behavior(behavior: CarrierBehavior) -> Self {
        let state = Arc::new(FakeState {
            behavior: Mutex::new(behavior),
            recorded: Recorded::default(),
        });

        let app = Router::new()
            .route("/oauth2/v3/token", post(token))
            .route("/prices/v3/base-rates/search", post(base_rate))
            .route("/addresses/v3/address", get(address))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}/")).unwrap(),
            state,
            server,
        }
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Change how the carrier answers from now on.
    pub fn update(&self, f: impl FnOnce(&mut CarrierBehavior)) {
        f(&mut self
            .state
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner));
    }

    #[must_use]
    pub fn token_requests(&self) -> usize {
        self.state.recorded.token_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rate_requests(&self) -> usize {
        self.state.recorded.rate_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn address_requests(&self) -> usize {
        self.state.recorded.address_requests.load(Ordering::SeqCst)
    }

    /// Total requests of any kind.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.token_requests() + self.rate_requests() + self.address_requests()
    }

    /// JSON bodies of every price request, in arrival order.
    #[must_use]
    pub fn rate_bodies(&self) -> Vec<Value> {
        self.state
            .recorded
            .rate_bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Query strings of every address request, in arrival order.
    #[must_use]
    pub fn address_queries(&self) -> Vec<HashMap<String, String>> {
        self.state
            .recorded
            .address_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for FakeCarrier {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {FAKE_ACCESS_TOKEN}"))
}

async fn token(State(fake): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    fake.recorded.token_requests.fetch_add(1, Ordering::SeqCst);
    let behavior = fake.behavior();

    if body["grant_type"] != "client_credentials" || body["client_secret"] != TEST_CLIENT_SECRET {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_request"})),
        )
            .into_response();
    }

    if behavior.token_status != StatusCode::OK {
        return (
            behavior.token_status,
            Json(json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed"
            })),
        )
            .into_response();
    }

    if let Some(body) = behavior.token_body {
        return raw_json(body);
    }

    Json(json!({
        "access_token": FAKE_ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": behavior.token_expires_in
    }))
    .into_response()
}

async fn base_rate(
    State(fake): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    fake.recorded.rate_requests.fetch_add(1, Ordering::SeqCst);
    let behavior = fake.behavior();
    let mail_class = body["mailClass"].as_str().unwrap_or_default().to_string();
    fake.recorded
        .rate_bodies
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(body);

    if !behavior.rate_delay.is_zero() {
        tokio::time::sleep(behavior.rate_delay).await;
    }

    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if behavior.rate_status != StatusCode::OK {
        return (behavior.rate_status, "carrier unavailable").into_response();
    }

    if let Some(body) = behavior.rate_body {
        return raw_json(body);
    }

    match behavior.prices.get(&mail_class) {
        Some(price) => Json(json!({ "totalBasePrice": price, "rates": [] })).into_response(),
        None => (StatusCode::BAD_REQUEST, "unknown mail class").into_response(),
    }
}

/// A 200 with a JSON content type and an arbitrary, possibly broken, body.
fn raw_json(body: &'static str) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

async fn address(
    State(fake): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    fake.recorded.address_requests.fetch_add(1, Ordering::SeqCst);
    fake.recorded
        .address_queries
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(query);
    let behavior = fake.behavior();

    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    (behavior.address_status, Json(behavior.address_body)).into_response()
}

/// A base URL nothing listens on.
///
/// # Panics
///
/// Panics if no local port can be bound.
#[allow(clippy::unwrap_used)]
pub async fn unreachable_base_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Carrier settings pointing at `base_url`.
#[must_use]
pub fn carrier_config(base_url: &Url) -> CarrierConfig {
    CarrierConfig {
        base_url: base_url.clone(),
        client_id: "aodai-test-client".to_string(),
        client_secret: SecretString::from(TEST_CLIENT_SECRET),
        timeout: Duration::from_secs(2),
    }
}

/// Shipping settings with the built-in fallback table.
///
/// # Panics
///
/// Never; the origin ZIP is a valid literal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn shipping_config() -> ShippingConfig {
    ShippingConfig {
        origin_zip: ZipCode::parse("95112").unwrap(),
        default_parcel: Parcel {
            weight: Decimal::ONE,
            length: Decimal::from(12),
            width: Decimal::from(9),
            height: Decimal::from(3),
        },
        fallback_rates: default_fallback_rates(),
    }
}

/// Full storefront config pointing at `base_url`.
#[must_use]
pub fn storefront_config(base_url: &Url) -> StorefrontConfig {
    StorefrontConfig {
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 0,
        proxy_trust: ProxyTrust::default(),
        carrier: carrier_config(base_url),
        shipping: shipping_config(),
        login_guard: LockoutPolicy::default(),
        login_guard_clear_token: Some(SecretString::from(TEST_CLEAR_TOKEN)),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A fixed point in time: 2026-03-14T09:26:53Z.
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::seconds(1_773_480_413)
}

/// Manual clock starting at [`test_time`].
#[must_use]
pub fn test_clock() -> ManualClock {
    ManualClock::new(test_time())
}
