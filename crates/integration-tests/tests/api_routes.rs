//! HTTP API behavior through the router, without binding a port.

use std::sync::Arc;

use aodai_core::ManualClock;
use aodai_integration_tests::{
    CarrierBehavior, FakeCarrier, TEST_CLEAR_TOKEN, storefront_config, test_clock,
    unreachable_base_url,
};
use aodai_storefront::config::StorefrontConfig;
use aodai_storefront::routes::routes;
use aodai_storefront::state::AppState;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use chrono::TimeDelta;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

fn app(base_url: &Url, clock: &ManualClock) -> Router {
    app_with_config(storefront_config(base_url), clock)
}

fn app_with_config(config: StorefrontConfig, clock: &ManualClock) -> Router {
    let state = AppState::with_clock(config, Arc::new(clock.clone())).expect("app state");
    routes().with_state(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cf-connecting-ip", "203.0.113.50")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn guard_request(method: Method, uri: &str, client_ip: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("cf-connecting-ip", client_ip)
        .body(Body::empty())
        .expect("request")
}

fn forwarded_request(method: Method, uri: &str, forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .expect("request")
}

fn clear_request(client_ip: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/login-guard/clients/{client_ip}"));
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

async fn lock_out(app: &Router, client_ip: &str) {
    for _ in 0..5 {
        send(
            app,
            guard_request(Method::POST, "/api/login-guard/failures", client_ip),
        )
        .await;
    }
}

fn rates_body() -> Value {
    json!({
        "destination": { "zipCode": "10001", "city": "New York", "state": "NY" },
        "items": [{ "weight": 2.0, "quantity": 1 }]
    })
}

#[tokio::test]
async fn test_health() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn test_rates_live() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/shipping/rates", &rates_body()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], false);
    assert!(body.get("warning").is_none());
    let rates = body["rates"].as_array().expect("rates");
    assert_eq!(rates.len(), 3);
    assert_eq!(rates[0]["serviceName"], "USPS Ground Advantage");
    assert_eq!(rates[0]["cost"], 8.45);
    assert_eq!(rates[0]["estimatedDays"], json!([2, 5]));
}

#[tokio::test]
async fn test_rates_fall_back_when_carrier_rejects_credentials() {
    let carrier = FakeCarrier::with_behavior(CarrierBehavior {
        token_status: StatusCode::UNAUTHORIZED,
        ..CarrierBehavior::default()
    })
    .await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/shipping/rates", &rates_body()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert!(body["warning"].is_string());
    assert_eq!(
        body["rates"],
        json!([
            { "serviceName": "Standard", "cost": 9.99, "estimatedDays": [5, 7] },
            { "serviceName": "Express", "cost": 19.99, "estimatedDays": [2, 3] },
            { "serviceName": "Overnight", "cost": 34.99, "estimatedDays": [1, 1] }
        ])
    );
}

#[tokio::test]
async fn test_rates_fall_back_when_carrier_unreachable() {
    let base_url = unreachable_base_url().await;
    let app = app(&base_url, &test_clock());

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/shipping/rates", &rates_body()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
}

#[tokio::test]
async fn test_rates_fall_back_on_malformed_carrier_body() {
    let carrier = FakeCarrier::with_behavior(CarrierBehavior {
        rate_body: Some("<html>maintenance</html>"),
        ..CarrierBehavior::default()
    })
    .await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/shipping/rates", &rates_body()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert!(body["warning"].is_string());
    assert_eq!(carrier.rate_requests(), 1);
}

#[tokio::test]
async fn test_rates_fall_back_on_empty_access_token() {
    let carrier = FakeCarrier::with_behavior(CarrierBehavior {
        token_body: Some(r#"{"access_token": "", "expires_in": 3600}"#),
        ..CarrierBehavior::default()
    })
    .await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/shipping/rates", &rates_body()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert_eq!(carrier.rate_requests(), 0);
}

#[tokio::test]
async fn test_rates_overflowing_cart_is_bad_request() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/shipping/rates",
            &json!({
                "destination": { "zipCode": "10001", "city": "New York", "state": "NY" },
                "items": [{ "weight": 1e20, "quantity": 4_294_967_295_u32 }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error").contains("too large"));
    assert_eq!(carrier.total_requests(), 0);
}

#[tokio::test]
async fn test_rates_missing_city_is_bad_request() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/shipping/rates",
            &json!({ "destination": { "zipCode": "10001", "city": "", "state": "NY" } }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error").contains("city"));
    assert_eq!(carrier.total_requests(), 0);
}

#[tokio::test]
async fn test_fallback_rates_endpoint() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());

    let request = Request::builder()
        .uri("/api/shipping/fallback-rates")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert_eq!(body["rates"].as_array().map(Vec::len), Some(3));
    assert_eq!(carrier.total_requests(), 0);
}

#[tokio::test]
async fn test_validate_address_endpoint() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/shipping/validate-address",
            &json!({
                "streetAddress": "2855 Stevens Creek Blvd",
                "city": "Santa Clara",
                "state": "CA",
                "zipCode": "95050"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], true);
    assert_eq!(body["normalized"]["zipPlus4"], "2803");
}

#[tokio::test]
async fn test_validate_address_carrier_down_is_bad_gateway() {
    let base_url = unreachable_base_url().await;
    let app = app(&base_url, &test_clock());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/shipping/validate-address",
            &json!({
                "streetAddress": "1 Main St",
                "city": "Austin",
                "state": "TX",
                "zipCode": "78701"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "External service error");
}

#[tokio::test]
async fn test_login_guard_locks_after_five_failures() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());
    let client = "198.51.100.23";

    for expected_remaining in [4, 3, 2, 1] {
        let (status, body) = send(
            &app,
            guard_request(Method::POST, "/api/login-guard/failures", client),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isLocked"], false);
        assert_eq!(body["attemptsRemaining"], expected_remaining);
    }

    let (_, body) = send(
        &app,
        guard_request(Method::POST, "/api/login-guard/failures", client),
    )
    .await;
    assert_eq!(body["isLocked"], true);
    assert_eq!(body["remainingLockoutMs"], 900_000);
    assert!(body.get("attemptsRemaining").is_none());

    // Another client is unaffected
    let (_, body) = send(
        &app,
        guard_request(Method::GET, "/api/login-guard", "198.51.100.24"),
    )
    .await;
    assert_eq!(body["isLocked"], false);
    assert_eq!(body["attemptsRemaining"], 5);
}

#[tokio::test]
async fn test_login_guard_clear_and_expiry() {
    let carrier = FakeCarrier::start().await;
    let clock = test_clock();
    let app = app(carrier.base_url(), &clock);
    let client = "2001:db8::7";

    lock_out(&app, client).await;

    clock.advance(TimeDelta::minutes(14));
    let (_, body) = send(&app, guard_request(Method::GET, "/api/login-guard", client)).await;
    assert_eq!(body["isLocked"], true);
    assert_eq!(body["remainingLockoutMs"], 60_000);

    let (status, _) = send(&app, clear_request(client, Some(TEST_CLEAR_TOKEN))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, guard_request(Method::GET, "/api/login-guard", client)).await;
    assert_eq!(body["isLocked"], false);
    assert_eq!(body["attemptsUsed"], 0);
}

#[tokio::test]
async fn test_login_guard_clear_requires_service_token() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());
    let client = "198.51.100.99";

    lock_out(&app, client).await;

    for token in [None, Some("wrong-token"), Some("Zt4r9QmX2vLp8Kw")] {
        let (status, body) = send(&app, clear_request(client, token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{token:?}");
        assert_eq!(body["error"], "Unauthorized");
    }

    let (_, body) = send(&app, guard_request(Method::GET, "/api/login-guard", client)).await;
    assert_eq!(body["isLocked"], true);
    assert_eq!(body["attemptsUsed"], 5);
}

#[tokio::test]
async fn test_login_guard_clear_disabled_without_configured_token() {
    let carrier = FakeCarrier::start().await;
    let mut config = storefront_config(carrier.base_url());
    config.login_guard_clear_token = None;
    let app = app_with_config(config, &test_clock());
    let client = "198.51.100.40";

    lock_out(&app, client).await;

    let (status, _) = send(&app, clear_request(client, Some(TEST_CLEAR_TOKEN))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = send(&app, guard_request(Method::GET, "/api/login-guard", client)).await;
    assert_eq!(body["isLocked"], true);
}

#[tokio::test]
async fn test_forged_forwarded_for_cannot_lock_out_another_client() {
    let carrier = FakeCarrier::start().await;
    let app = app(carrier.base_url(), &test_clock());
    let victim = "198.51.100.99";

    for _ in 0..5 {
        send(
            &app,
            forwarded_request(Method::POST, "/api/login-guard/failures", victim),
        )
        .await;
    }

    let (_, body) = send(&app, guard_request(Method::GET, "/api/login-guard", victim)).await;
    assert_eq!(body["isLocked"], false);
    assert_eq!(body["attemptsUsed"], 0);
}

#[tokio::test]
async fn test_forwarded_for_is_used_behind_trusted_proxy() {
    let carrier = FakeCarrier::start().await;
    let mut config = storefront_config(carrier.base_url());
    config.proxy_trust.forwarded_headers = true;
    let app = app_with_config(config, &test_clock());
    let client = "198.51.100.61";

    send(
        &app,
        forwarded_request(Method::POST, "/api/login-guard/failures", &format!("{client}, 10.0.0.1")),
    )
    .await;

    let (_, body) = send(&app, forwarded_request(Method::GET, "/api/login-guard", client)).await;
    assert_eq!(body["attemptsUsed"], 1);
    assert_eq!(body["attemptsRemaining"], 4);
}
