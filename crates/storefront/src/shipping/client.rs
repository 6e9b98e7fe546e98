//! Carrier pricing and address-validation client.

use std::sync::Arc;

use aodai_core::{
    Address, AddressValidation, Clock, Destination, PackageItem, Parcel, ShippingQuote,
    SystemClock, ZipCode,
};
use chrono::NaiveDate;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

use super::auth::{CarrierToken, TOKEN_PATH, request_token};
use super::{CARRIER_SERVICES, CarrierService, ShippingError};
use crate::config::{CarrierConfig, ShippingConfig, default_fallback_rates};

/// Price search endpoint, relative to the carrier base URL.
const RATES_PATH: &str = "prices/v3/base-rates/search";

/// Address lookup endpoint, relative to the carrier base URL.
const ADDRESS_PATH: &str = "addresses/v3/address";

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Shipping rate estimator backed by the carrier API.
///
/// Cheap to clone; clones share the HTTP client and the token cache.
///
/// # Authentication
///
/// Uses OAuth2 client credentials. The access token is cached in memory and
/// fetched again once it is within a minute of expiry. Concurrent callers
/// that all find the token expired may each refresh it; the last write wins.
#[derive(Clone)]
pub struct ShippingRateEstimator {
    inner: Arc<EstimatorInner>,
}

struct EstimatorInner {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    client_secret: SecretString,
    origin_zip: ZipCode,
    default_parcel: Parcel,
    fallback_rates: Vec<ShippingQuote>,
    clock: Arc<dyn Clock>,
    /// In-memory token cache
    token: RwLock<Option<CarrierToken>>,
}

/// Body of a base-rate search.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BaseRateRequest<'a> {
    #[serde(rename = "originZIPCode")]
    origin_zip_code: &'a str,
    #[serde(rename = "destinationZIPCode")]
    destination_zip_code: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    weight: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    length: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    width: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    height: Decimal,
    mail_class: &'static str,
    processing_category: &'static str,
    destination_entry_facility_type: &'static str,
    rate_indicator: &'static str,
    price_type: &'static str,
    mailing_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaseRateResponse {
    #[serde(with = "rust_decimal::serde::float")]
    total_base_price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressResponse {
    #[serde(default)]
    address: Option<CarrierAddress>,
    #[serde(default)]
    additional_info: Option<AdditionalInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CarrierAddress {
    street_address: String,
    #[serde(default)]
    secondary_address: Option<String>,
    city: String,
    state: String,
    #[serde(rename = "ZIPCode")]
    zip_code: String,
    #[serde(rename = "ZIPPlus4", default)]
    zip_plus4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdditionalInfo {
    /// Delivery point confirmation: `Y` confirmed, `D`/`S` secondary
    /// missing or unconfirmed, `N` not deliverable.
    #[serde(rename = "DPVConfirmation", default)]
    dpv_confirmation: Option<String>,
}

impl ShippingRateEstimator {
    /// Create an estimator using wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::CarrierTransport` if the HTTP client cannot be
    /// built.
    pub fn new(carrier: &CarrierConfig, shipping: &ShippingConfig) -> Result<Self, ShippingError> {
        Self::with_clock(carrier, shipping, Arc::new(SystemClock))
    }

    /// Create an estimator with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::CarrierTransport` if the HTTP client cannot be
    /// built.
    pub fn with_clock(
        carrier: &CarrierConfig,
        shipping: &ShippingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ShippingError> {
        let client = reqwest::Client::builder()
            .timeout(carrier.timeout)
            .connect_timeout(carrier.timeout)
            .user_agent(concat!("aodai-storefront/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ShippingError::CarrierTransport(format!("failed to build HTTP client: {e}")))?;

        let fallback_rates = if shipping.fallback_rates.is_empty() {
            default_fallback_rates()
        } else {
            shipping.fallback_rates.clone()
        };

        Ok(Self {
            inner: Arc::new(EstimatorInner {
                client,
                base_url: carrier.base_url.clone(),
                client_id: carrier.client_id.clone(),
                client_secret: carrier.client_secret.clone(),
                origin_zip: shipping.origin_zip.clone(),
                default_parcel: shipping.default_parcel,
                fallback_rates,
                clock,
                token: RwLock::new(None),
            }),
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Return a valid access token, exchanging credentials if the cached one
    /// is missing or expired.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::CarrierAuth` if the carrier rejects the
    /// credentials or returns an unusable token. A token endpoint that cannot
    /// be reached at all (connection refused, timeout) is reported as
    /// `ShippingError::CarrierTransport`, not `CarrierAuth`; both allow
    /// fallback.
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<SecretString, ShippingError> {
        let now = self.inner.clock.now();

        if let Some(token) = self
            .inner
            .token
            .read()
            .await
            .as_ref()
            .filter(|token| !token.is_expired(now))
        {
            return Ok(token.access_token.clone());
        }

        let endpoint = self.endpoint(TOKEN_PATH)?;
        let token = request_token(
            &self.inner.client,
            &endpoint,
            &self.inner.client_id,
            &self.inner.client_secret,
            now,
        )
        .await?;

        let access_token = token.access_token.clone();
        *self.inner.token.write().await = Some(token);
        Ok(access_token)
    }

    /// Drop the cached token so the next call authenticates again.
    pub async fn invalidate_token(&self) {
        *self.inner.token.write().await = None;
    }

    // =========================================================================
    // Rates
    // =========================================================================

    /// Quote live shipping rates for a destination.
    ///
    /// The destination is validated before any network call. Items without
    /// weights or dimensions fall back to the configured default parcel.
    /// Quotes are returned cheapest first.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::InvalidDestination` for an incomplete
    /// destination and `ShippingError::InvalidItems` when the cart totals
    /// overflow; both are raised before any network call. Any other variant means live pricing is unavailable and
    /// the caller should use [`Self::fallback_rates`].
    #[instrument(
        skip(self, destination, items),
        fields(destination_zip = %destination.zip_code, items = items.len())
    )]
    pub async fn calculate_shipping_rates(
        &self,
        destination: &Destination,
        items: &[PackageItem],
    ) -> Result<Vec<ShippingQuote>, ShippingError> {
        let destination = destination.validate()?;
        let parcel = Parcel::estimate(items, &self.inner.default_parcel)?;
        let access_token = self.access_token().await?;
        let endpoint = self.endpoint(RATES_PATH)?;
        let mailing_date = self.inner.clock.now().date_naive();

        let mut quotes = Vec::with_capacity(CARRIER_SERVICES.len());
        for service in &CARRIER_SERVICES {
            let request = BaseRateRequest {
                origin_zip_code: self.inner.origin_zip.base(),
                destination_zip_code: destination.zip_code.base(),
                weight: parcel.weight,
                length: parcel.length,
                width: parcel.width,
                height: parcel.height,
                mail_class: service.mail_class,
                processing_category: "MACHINABLE",
                destination_entry_facility_type: "NONE",
                rate_indicator: "SP",
                price_type: "RETAIL",
                mailing_date,
            };
            let cost = self.price(&endpoint, &access_token, &request).await?;
            quotes.push(live_quote(service, cost));
        }

        quotes.sort_by(|a, b| a.cost.cmp(&b.cost));
        tracing::debug!(quotes = quotes.len(), "live shipping rates calculated");
        Ok(quotes)
    }

    /// Static, destination-independent rate table. Never empty.
    #[must_use]
    pub fn fallback_rates(&self) -> Vec<ShippingQuote> {
        self.inner.fallback_rates.clone()
    }

    async fn price(
        &self,
        endpoint: &Url,
        access_token: &SecretString,
        request: &BaseRateRequest<'_>,
    ) -> Result<Decimal, ShippingError> {
        let response = self
            .inner
            .client
            .post(endpoint.clone())
            .bearer_auth(access_token.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate_token().await;
            return Err(ShippingError::CarrierAuth(format!(
                "rate request rejected access token: HTTP {status}"
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShippingError::CarrierTransport(format!(
                "rate request for {} failed: HTTP {status}: {}",
                request.mail_class,
                truncate(&body)
            )));
        }

        let body: BaseRateResponse = response
            .json()
            .await
            .map_err(|e| ShippingError::CarrierResponse(format!("rate response: {e}")))?;

        if body.total_base_price.is_sign_negative() {
            return Err(ShippingError::CarrierResponse(format!(
                "negative price {} for {}",
                body.total_base_price, request.mail_class
            )));
        }

        Ok(body.total_base_price.round_dp(2))
    }

    // =========================================================================
    // Address validation
    // =========================================================================

    /// Validate and normalize an address with the carrier.
    ///
    /// An address the carrier cannot match is a successful call with
    /// `is_valid: false`.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::AddressValidation` when the carrier cannot be
    /// reached or rejects our credentials. There is no fallback.
    #[instrument(skip(self, address), fields(zip = %address.zip_code))]
    pub async fn validate_address(
        &self,
        address: &Address,
    ) -> Result<AddressValidation, ShippingError> {
        self.lookup_address(address).await.map_err(|e| match e {
            err @ ShippingError::AddressValidation(_) => err,
            other => ShippingError::AddressValidation(other.to_string()),
        })
    }

    async fn lookup_address(&self, address: &Address) -> Result<AddressValidation, ShippingError> {
        let access_token = self.access_token().await?;
        let endpoint = self.endpoint(ADDRESS_PATH)?;

        let zip = ZipCode::parse(&address.zip_code).ok();
        let mut query: Vec<(&str, &str)> = vec![
            ("streetAddress", address.street_address.trim()),
            ("city", address.city.trim()),
            ("state", address.state.trim()),
            (
                "ZIPCode",
                zip.as_ref().map_or(address.zip_code.trim(), ZipCode::base),
            ),
        ];
        if let Some(secondary) = address.secondary_address.as_deref() {
            query.push(("secondaryAddress", secondary.trim()));
        }
        if let Some(plus4) = address
            .zip_plus4
            .as_deref()
            .or_else(|| zip.as_ref().and_then(ZipCode::plus4))
        {
            query.push(("ZIPPlus4", plus4));
        }

        let response = self
            .inner
            .client
            .get(endpoint)
            .bearer_auth(access_token.expose_secret())
            .query(&query)
            .send()
            .await?;

        let status = response.status();

        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                tracing::debug!(%status, "carrier could not match address");
                Ok(AddressValidation::invalid())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.invalidate_token().await;
                Err(ShippingError::CarrierAuth(format!(
                    "address request rejected access token: HTTP {status}"
                )))
            }
            s if s.is_success() => {
                let body: AddressResponse = response
                    .json()
                    .await
                    .map_err(|e| ShippingError::CarrierResponse(format!("address response: {e}")))?;
                Ok(validation_from_response(body))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ShippingError::CarrierTransport(format!(
                    "address request failed: HTTP {status}: {}",
                    truncate(&body)
                )))
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ShippingError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ShippingError::CarrierTransport(format!("invalid carrier URL: {e}")))
    }
}

impl std::fmt::Debug for ShippingRateEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingRateEstimator")
            .field("base_url", &self.inner.base_url.as_str())
            .field("client_id", &self.inner.client_id)
            .field("origin_zip", &self.inner.origin_zip)
            .finish_non_exhaustive()
    }
}

fn live_quote(service: &CarrierService, cost: Decimal) -> ShippingQuote {
    ShippingQuote {
        service_name: service.display_name.to_string(),
        cost,
        estimated_days: service.transit,
        carrier_service: Some(service.mail_class.to_string()),
    }
}

fn validation_from_response(body: AddressResponse) -> AddressValidation {
    let Some(found) = body.address else {
        return AddressValidation::invalid();
    };

    let address = Address {
        street_address: found.street_address,
        secondary_address: found.secondary_address.filter(|s| !s.trim().is_empty()),
        city: found.city,
        state: found.state,
        zip_code: found.zip_code,
        zip_plus4: found.zip_plus4.filter(|s| !s.trim().is_empty()),
    };

    let confirmed = body
        .additional_info
        .and_then(|info| info.dpv_confirmation)
        .is_none_or(|dpv| dpv.eq_ignore_ascii_case("Y"));

    if confirmed {
        AddressValidation {
            is_valid: true,
            normalized: Some(address),
            suggestions: Vec::new(),
        }
    } else {
        AddressValidation {
            is_valid: false,
            normalized: None,
            suggestions: vec![address],
        }
    }
}

fn truncate(body: &str) -> &str {
    body.char_indices()
        .nth(MAX_ERROR_BODY)
        .map_or(body, |(idx, _)| body.get(..idx).unwrap_or(body))
}
