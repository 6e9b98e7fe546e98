//! Carrier shipping-rate and address-validation client.
//!
//! Quotes shipping for checkout from the carrier's live pricing API and
//! validates customer addresses.
//!
//! # Architecture
//!
//! - OAuth2 client-credentials exchange; the access token is cached in memory
//!   per estimator and refreshed lazily once it nears expiry
//! - One priced request per carrier service (see [`CARRIER_SERVICES`])
//! - Every request is bounded by the configured timeout
//!
//! # Fallback
//!
//! The estimator never substitutes static rates on its own. Callers invoke
//! [`ShippingRateEstimator::calculate_shipping_rates`], and on any error other
//! than [`ShippingError::InvalidDestination`] or [`ShippingError::InvalidItems`]
//! log the reason and use
//! [`ShippingRateEstimator::fallback_rates`] instead.

pub mod auth;
pub mod client;

pub use auth::CarrierToken;
pub use client::ShippingRateEstimator;

use aodai_core::{DestinationError, ParcelError, TransitDays};
use thiserror::Error;

/// Errors that can occur when talking to the carrier.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// The destination is missing a ZIP code, city, or state (caller's fault).
    #[error("Invalid destination: {0}")]
    InvalidDestination(#[from] DestinationError),

    /// The cart items cannot be packed into a parcel (caller's fault).
    #[error("Invalid items: {0}")]
    InvalidItems(#[from] ParcelError),

    /// The token endpoint rejected our credentials or returned an unusable token.
    #[error("Carrier authentication failed: {0}")]
    CarrierAuth(String),

    /// Network failure, timeout, or non-2xx status from the carrier.
    #[error("Carrier request failed: {0}")]
    CarrierTransport(String),

    /// The carrier answered 2xx but the body could not be understood.
    #[error("Unexpected carrier response: {0}")]
    CarrierResponse(String),

    /// Address validation could not be performed.
    #[error("Address validation failed: {0}")]
    AddressValidation(String),
}

impl ShippingError {
    /// Whether a caller should substitute fallback rates for this error.
    #[must_use]
    pub const fn allows_fallback(&self) -> bool {
        !self.is_client_error()
    }

    /// Whether the request itself was bad, as opposed to the carrier failing.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidDestination(_) | Self::InvalidItems(_))
    }
}

impl From<reqwest::Error> for ShippingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::CarrierResponse(err.to_string())
        } else if err.is_timeout() {
            Self::CarrierTransport(format!("request timed out: {err}"))
        } else {
            Self::CarrierTransport(err.to_string())
        }
    }
}

/// A carrier service level we request prices for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierService {
    /// Carrier's mail class code.
    pub mail_class: &'static str,
    /// Name shown at checkout.
    pub display_name: &'static str,
    /// Published delivery standard.
    pub transit: TransitDays,
}

/// Services priced for every checkout, cheapest first.
pub const CARRIER_SERVICES: [CarrierService; 3] = [
    CarrierService {
        mail_class: "USPS_GROUND_ADVANTAGE",
        display_name: "USPS Ground Advantage",
        transit: TransitDays::new(2, 5),
    },
    CarrierService {
        mail_class: "PRIORITY_MAIL",
        display_name: "Priority Mail",
        transit: TransitDays::new(1, 3),
    },
    CarrierService {
        mail_class: "PRIORITY_MAIL_EXPRESS",
        display_name: "Priority Mail Express",
        transit: TransitDays::new(1, 2),
    },
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_invalid_destination_display() {
        let err = ShippingError::from(DestinationError::MissingField("zipCode"));
        assert_eq!(
            err.to_string(),
            "Invalid destination: destination is missing required field `zipCode`"
        );
        assert!(!err.allows_fallback());
    }

    #[test]
    fn test_invalid_items_do_not_fall_back() {
        let err = ShippingError::from(ParcelError::WeightOverflow);
        assert_eq!(err.to_string(), "Invalid items: cart weight is too large to ship");
        assert!(err.is_client_error());
        assert!(!err.allows_fallback());
    }

    #[test]
    fn test_carrier_errors_allow_fallback() {
        assert!(ShippingError::CarrierAuth("401".to_string()).allows_fallback());
        assert!(ShippingError::CarrierTransport("timeout".to_string()).allows_fallback());
        assert!(ShippingError::CarrierResponse("bad json".to_string()).allows_fallback());
    }

    #[test]
    fn test_carrier_auth_display() {
        let err = ShippingError::CarrierAuth("HTTP 401 Unauthorized: invalid_client".to_string());
        assert_eq!(
            err.to_string(),
            "Carrier authentication failed: HTTP 401 Unauthorized: invalid_client"
        );
    }

    #[test]
    fn test_service_catalog_codes_are_unique() {
        let codes: HashSet<_> = CARRIER_SERVICES.iter().map(|s| s.mail_class).collect();
        assert_eq!(codes.len(), CARRIER_SERVICES.len());
    }
}
