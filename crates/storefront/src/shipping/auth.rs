//! Carrier OAuth2 client-credentials exchange.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::ShippingError;

/// Token endpoint, relative to the carrier base URL.
pub const TOKEN_PATH: &str = "oauth2/v3/token";

/// Tokens are treated as expired this many seconds before the carrier says they are.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access token obtained from the carrier.
#[derive(Debug, Clone)]
pub struct CarrierToken {
    /// Bearer token for API requests.
    pub access_token: SecretString,
    /// When the carrier stops accepting the token.
    pub expires_at: DateTime<Utc>,
}

impl CarrierToken {
    /// Whether the token is past, or within a minute of, its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - TimeDelta::seconds(EXPIRY_MARGIN_SECS)
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchange client credentials for an access token.
///
/// # Errors
///
/// Returns `ShippingError::CarrierAuth` if the carrier rejects the
/// credentials or answers with an unusable token, and
/// `ShippingError::CarrierTransport` if the endpoint cannot be reached.
#[instrument(skip(client, client_secret), fields(endpoint = %endpoint))]
pub async fn request_token(
    client: &reqwest::Client,
    endpoint: &Url,
    client_id: &str,
    client_secret: &SecretString,
    now: DateTime<Utc>,
) -> Result<CarrierToken, ShippingError> {
    let response = client
        .post(endpoint.clone())
        .json(&TokenRequest {
            grant_type: "client_credentials",
            client_id,
            client_secret: client_secret.expose_secret(),
        })
        .send()
        .await
        .map_err(|e| ShippingError::CarrierTransport(format!("token endpoint unreachable: {e}")))?;

    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<TokenErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error_description.or(e.error))
            .unwrap_or(body);
        return Err(ShippingError::CarrierAuth(format!("HTTP {status}: {detail}")));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ShippingError::CarrierAuth(format!("malformed token response: {e}")))?;

    if token.access_token.is_empty() || token.expires_in <= 0 {
        return Err(ShippingError::CarrierAuth(
            "token response missing access_token or expires_in".to_string(),
        ));
    }

    let expires_at = expiry(now, token.expires_in)?;
    tracing::debug!(expires_in = token.expires_in, "obtained carrier access token");

    Ok(CarrierToken {
        access_token: SecretString::from(token.access_token),
        expires_at,
    })
}

/// `now + expires_in` seconds, rejecting lifetimes chrono cannot represent.
fn expiry(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, ShippingError> {
    TimeDelta::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            ShippingError::CarrierAuth(format!("token expires_in out of range: {expires_in}"))
        })
}
