//! Client identification and rate limiting using governor and `tower_governor`.
//!
//! The same IP resolution feeds both the rate limiter and the per-client
//! login guards, so a client is one key everywhere. Only headers the edge
//! proxy overwrites are believed unless [`ProxyTrust`] says otherwise.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::{HeaderMap, Request, request::Parts};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Headers set by the edge proxies (Cloudflare, Fly.io). Both overwrite any
/// value the client sent.
const EDGE_IP_HEADERS: [&str; 2] = ["cf-connecting-ip", "fly-client-ip"];

/// Headers any client can forge. Only read behind a trusted proxy.
const FORWARDED_IP_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Which client-supplied forwarding headers to believe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyTrust {
    /// Read `X-Forwarded-For` and `X-Real-IP` after the edge headers.
    /// Enable only when a proxy we run rewrites them.
    pub forwarded_headers: bool,
}

/// Resolve the client IP from Cloudflare and Fly.io proxy headers, plus
/// `X-Forwarded-For`/`X-Real-IP` when `trust` allows.
///
/// `X-Forwarded-For` contributes its first hop only. Headers that do not
/// parse as an IP are skipped.
#[must_use]
pub fn client_ip_from_headers(headers: &HeaderMap, trust: ProxyTrust) -> Option<IpAddr> {
    let forwarded: &[&str] = if trust.forwarded_headers {
        &FORWARDED_IP_HEADERS
    } else {
        &[]
    };

    EDGE_IP_HEADERS.iter().chain(forwarded).find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    })
}

fn peer_ip(extensions: &axum::http::Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

// =============================================================================
// Client key extractor
// =============================================================================

/// Key identifying the calling client, normally its IP address.
///
/// Falls back to the socket peer when no proxy header is present, and to
/// `"unknown"` when the server was started without connect info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ClientKey
where
    ProxyTrust: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = client_ip_from_headers(&parts.headers, ProxyTrust::from_ref(state))
            .or_else(|| peer_ip(&parts.extensions))
            .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
        Ok(Self(key))
    }
}

/// Governor key extractor using the same resolution as [`ClientKey`].
#[derive(Debug, Clone, Copy)]
pub struct ClientIpKeyExtractor {
    trust: ProxyTrust,
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        client_ip_from_headers(req.headers(), self.trust)
            .or_else(|| peer_ip(req.extensions()))
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for the JSON API: ~100 requests per minute per IP.
///
/// Configuration: 1 request per second (replenish), burst of 50.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(1)` and `burst_size(50)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn api_rate_limiter(trust: ProxyTrust) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor { trust })
        .per_second(1)
        .burst_size(50)
        .finish()
        .expect("rate limiter config with per_second(1) and burst_size(50) is valid");
    GovernorLayer::new(Arc::new(config))
}
