//! Shipping rate and address validation endpoints.

use aodai_core::{Address, AddressValidation, Destination, PackageItem, ShippingQuote};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Checkout rate request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatesRequest {
    pub destination: Destination,
    #[serde(default)]
    pub items: Vec<PackageItem>,
}

/// Rates offered at checkout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatesResponse {
    pub rates: Vec<ShippingQuote>,
    /// True when live pricing failed and the static table was used.
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Shown to shoppers when flat rates replace live pricing.
const FALLBACK_WARNING: &str = "Live shipping rates are unavailable; showing standard rates.";

/// Quote rates for a cart, substituting the fallback table when the carrier
/// cannot price it.
///
/// An incomplete destination or an unpackable cart is a 400 and never
/// falls back.
#[instrument(skip(state, request), fields(destination_zip = %request.destination.zip_code))]
pub async fn rates(
    State(state): State<AppState>,
    Json(request): Json<RatesRequest>,
) -> Result<Json<RatesResponse>> {
    let estimator = state.shipping();

    match estimator
        .calculate_shipping_rates(&request.destination, &request.items)
        .await
    {
        Ok(rates) => Ok(Json(RatesResponse {
            rates,
            fallback: false,
            warning: None,
        })),
        Err(err) if err.allows_fallback() => {
            tracing::warn!(error = %err, "live shipping rates unavailable, using fallback table");
            add_breadcrumb(
                "shipping",
                "Fell back to static shipping rates",
                &[("reason", err.to_string().as_str())],
            );
            Ok(Json(RatesResponse {
                rates: estimator.fallback_rates(),
                fallback: true,
                warning: Some(FALLBACK_WARNING.to_string()),
            }))
        }
        Err(err) => Err(err.into()),
    }
}

/// Static rate table, in the same shape as a rates response.
pub async fn fallback_rates(State(state): State<AppState>) -> Json<RatesResponse> {
    Json(RatesResponse {
        rates: state.shipping().fallback_rates(),
        fallback: true,
        warning: None,
    })
}

/// Validate and normalize an address with the carrier.
#[instrument(skip(state, address), fields(zip = %address.zip_code))]
pub async fn validate_address(
    State(state): State<AppState>,
    Json(address): Json<Address>,
) -> Result<Json<AddressValidation>> {
    if address.street_address.trim().is_empty() || address.zip_code.trim().is_empty() {
        return Err(AppError::BadRequest(
            "streetAddress and zipCode are required".to_string(),
        ));
    }

    let validation = state
        .shipping()
        .validate_address(&address)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "address validation unavailable");
            AppError::from(err)
        })?;

    Ok(Json(validation))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_request_defaults_items() {
        let request: RatesRequest = serde_json::from_str(
            r#"{"destination": {"zipCode": "10001", "city": "New York", "state": "NY"}}"#,
        )
        .unwrap();
        assert!(request.items.is_empty());
        assert_eq!(request.destination.zip_code, "10001");
    }

    #[test]
    fn test_rates_response_omits_missing_warning() {
        let json = serde_json::to_value(RatesResponse {
            rates: Vec::new(),
            fallback: false,
            warning: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"rates": [], "fallback": false}));
    }
}
