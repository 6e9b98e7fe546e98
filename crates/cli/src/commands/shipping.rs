//! Shipping commands: quote rates, validate addresses, check credentials.
//!
//! # Usage
//!
//! ```bash
//! # Quote live rates (falls back to the static table if the carrier fails)
//! aodai shipping rates --zip 10001 --city "New York" --state NY --weight 2.5
//!
//! # Print the static fallback table
//! aodai shipping fallback
//!
//! # Validate an address with the carrier
//! aodai shipping validate-address --street "2855 Stevens Creek Blvd" \
//!     --city "Santa Clara" --state CA --zip 95050
//!
//! # Confirm the carrier accepts our client credentials
//! aodai shipping check-credentials
//! ```
//!
//! # Environment Variables
//!
//! Same as the storefront server: `CARRIER_CLIENT_ID`, `CARRIER_CLIENT_SECRET`,
//! `SHIPPING_ORIGIN_ZIP`, and the optional shipping settings.

use aodai_core::{Address, Destination, PackageItem};
use aodai_storefront::config::{CarrierConfig, ConfigError, ShippingConfig};
use aodai_storefront::routes::shipping::RatesResponse;
use aodai_storefront::shipping::{ShippingError, ShippingRateEstimator};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while running a shipping command.
#[derive(Debug, Error)]
pub enum ShippingCommandError {
    /// Environment configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Carrier operation failed.
    #[error(transparent)]
    Shipping(#[from] ShippingError),

    /// `--items` was not a JSON list of package items.
    #[error("Invalid --items JSON: {0}")]
    InvalidItems(serde_json::Error),

    /// Output could not be serialized.
    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn estimator() -> Result<ShippingRateEstimator, ShippingCommandError> {
    dotenvy::dotenv().ok();
    let carrier = CarrierConfig::from_env()?;
    let shipping = ShippingConfig::from_env()?;
    Ok(ShippingRateEstimator::new(&carrier, &shipping)?)
}

/// Parse the package list from `--items` JSON and/or a single `--weight`.
///
/// # Errors
///
/// Returns `ShippingCommandError::InvalidItems` if the JSON does not parse.
pub fn parse_items(
    items_json: Option<&str>,
    weight: Option<Decimal>,
) -> Result<Vec<PackageItem>, ShippingCommandError> {
    let mut items: Vec<PackageItem> = match items_json {
        Some(json) => serde_json::from_str(json).map_err(ShippingCommandError::InvalidItems)?,
        None => Vec::new(),
    };
    if let Some(weight) = weight {
        items.push(PackageItem::with_weight(weight));
    }
    Ok(items)
}

/// Quote rates for a destination, falling back to the static table when the
/// carrier cannot price it.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the destination is
/// incomplete.
#[allow(clippy::print_stdout)]
pub async fn rates(
    destination: Destination,
    items: Vec<PackageItem>,
) -> Result<(), ShippingCommandError> {
    let estimator = estimator()?;

    let response = match estimator.calculate_shipping_rates(&destination, &items).await {
        Ok(rates) => RatesResponse {
            rates,
            fallback: false,
            warning: None,
        },
        Err(err) if err.allows_fallback() => {
            tracing::warn!("Live rates unavailable, using fallback table: {err}");
            RatesResponse {
                rates: estimator.fallback_rates(),
                fallback: true,
                warning: Some(err.to_string()),
            }
        }
        Err(err) => return Err(err.into()),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Print the static fallback table.
///
/// Needs only the shipping settings, not carrier credentials.
///
/// # Errors
///
/// Returns an error if the shipping configuration is invalid.
#[allow(clippy::print_stdout)]
pub fn fallback() -> Result<(), ShippingCommandError> {
    dotenvy::dotenv().ok();
    let shipping = ShippingConfig::from_env()?;
    println!("{}", serde_json::to_string_pretty(&shipping.fallback_rates)?);
    Ok(())
}

/// Validate an address and print the carrier's verdict.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the carrier is
/// unavailable.
#[allow(clippy::print_stdout)]
pub async fn validate_address(address: Address) -> Result<(), ShippingCommandError> {
    let estimator = estimator()?;
    let validation = estimator.validate_address(&address).await?;

    if !validation.is_valid {
        tracing::warn!("Carrier could not confirm {}", address.street_address);
    }

    println!("{}", serde_json::to_string_pretty(&validation)?);
    Ok(())
}

/// Exchange the configured client credentials for a token.
///
/// # Errors
///
/// Returns an error if the carrier rejects the credentials or is unreachable.
pub async fn check_credentials() -> Result<(), ShippingCommandError> {
    let estimator = estimator()?;
    tracing::info!("Requesting carrier access token...");
    estimator.access_token().await?;
    tracing::info!("Carrier credentials accepted");
    Ok(())
}
