//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARRIER_CLIENT_ID` - Carrier OAuth client ID
//! - `CARRIER_CLIENT_SECRET` - Carrier OAuth client secret (high entropy)
//! - `SHIPPING_ORIGIN_ZIP` - ZIP code parcels ship from
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_TRUST_FORWARDED_HEADERS` - Believe `X-Forwarded-For`/`X-Real-IP`
//!   (default: false; only behind a proxy that rewrites them)
//! - `CARRIER_API_BASE_URL` - Carrier API root (default: <https://apis.usps.com>)
//! - `CARRIER_TIMEOUT_SECS` - Per-request timeout for carrier calls (default: 10)
//! - `SHIPPING_DEFAULT_WEIGHT_LB` - Parcel weight when the cart has none (default: 1)
//! - `SHIPPING_DEFAULT_LENGTH_IN` / `_WIDTH_IN` / `_HEIGHT_IN` - Default box (12 x 9 x 3)
//! - `SHIPPING_FALLBACK_RATES` - JSON array of quotes replacing the built-in table
//! - `LOGIN_MAX_ATTEMPTS` - Failures before lockout (default: 5)
//! - `LOGIN_ATTEMPT_WINDOW_SECS` - Window for counting failures (default: 300)
//! - `LOGIN_LOCKOUT_SECS` - Lockout length (default: 900)
//! - `LOGIN_GUARD_CLEAR_TOKEN` - Bearer token the auth backend presents to
//!   clear a client after a successful login (unset: clearing disabled)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use aodai_core::{Parcel, ShippingQuote, TransitDays, ZipCode};
use chrono::TimeDelta;
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::login_guard::LockoutPolicy;
use crate::middleware::ProxyTrust;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_CARRIER_BASE_URL: &str = "https://apis.usps.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Forwarding headers believed when identifying clients
    pub proxy_trust: ProxyTrust,
    /// Carrier API access
    pub carrier: CarrierConfig,
    /// Parcel defaults and the fallback rate table
    pub shipping: ShippingConfig,
    /// Login attempt limits
    pub login_guard: LockoutPolicy,
    /// Service token required to clear a client's login guard
    pub login_guard_clear_token: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Carrier API configuration.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct CarrierConfig {
    /// API root; always ends with `/` so relative endpoints join underneath it
    pub base_url: Url,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Upper bound for any single carrier request
    pub timeout: Duration,
}

impl std::fmt::Debug for CarrierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierConfig")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Shipping estimation settings.
#[derive(Debug, Clone)]
pub struct ShippingConfig {
    /// ZIP code parcels ship from; the carrier prices by ZIP alone
    pub origin_zip: ZipCode,
    /// Parcel used when the cart carries no weights/dimensions
    pub default_parcel: Parcel,
    /// Static quotes shown when live rates are unavailable (never empty)
    pub fallback_rates: Vec<ShippingQuote>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_parsed_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = get_parsed_env("STOREFRONT_PORT", "3000")?;
        let proxy_trust = ProxyTrust {
            forwarded_headers: get_parsed_env("STOREFRONT_TRUST_FORWARDED_HEADERS", "false")?,
        };
        let login_guard_clear_token = match get_optional_env("LOGIN_GUARD_CLEAR_TOKEN") {
            Some(token) => {
                validate_secret_strength(&token, "LOGIN_GUARD_CLEAR_TOKEN")?;
                Some(SecretString::from(token))
            }
            None => None,
        };

        Ok(Self {
            host,
            port,
            proxy_trust,
            carrier: CarrierConfig::from_env()?,
            shipping: ShippingConfig::from_env()?,
            login_guard: lockout_policy_from_env()?,
            login_guard_clear_token,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CarrierConfig {
    /// Load carrier settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if credentials are missing or weak, or the base
    /// URL or timeout do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_env_or_default("CARRIER_API_BASE_URL", DEFAULT_CARRIER_BASE_URL);
        let timeout_secs: u64 = get_parsed_env("CARRIER_TIMEOUT_SECS", "10")?;

        Ok(Self {
            base_url: normalize_base_url(&base_url)
                .map_err(|e| ConfigError::InvalidEnvVar("CARRIER_API_BASE_URL".to_string(), e))?,
            client_id: get_required_env("CARRIER_CLIENT_ID")?,
            client_secret: get_validated_secret("CARRIER_CLIENT_SECRET")?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl ShippingConfig {
    /// Load origin, parcel defaults, and fallback table from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the origin ZIP is missing or malformed, a
    /// default dimension is not a positive number, or the fallback override
    /// is not a non-empty JSON quote list.
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin_zip = get_required_env("SHIPPING_ORIGIN_ZIP")?;
        let origin_zip = ZipCode::parse(&origin_zip)
            .map_err(|e| ConfigError::InvalidEnvVar("SHIPPING_ORIGIN_ZIP".to_string(), e.to_string()))?;

        let default_parcel = Parcel {
            weight: get_positive_decimal("SHIPPING_DEFAULT_WEIGHT_LB", "1")?,
            length: get_positive_decimal("SHIPPING_DEFAULT_LENGTH_IN", "12")?,
            width: get_positive_decimal("SHIPPING_DEFAULT_WIDTH_IN", "9")?,
            height: get_positive_decimal("SHIPPING_DEFAULT_HEIGHT_IN", "3")?,
        };

        let fallback_rates = match get_optional_env("SHIPPING_FALLBACK_RATES") {
            Some(json) => parse_fallback_rates(&json)
                .map_err(|e| ConfigError::InvalidEnvVar("SHIPPING_FALLBACK_RATES".to_string(), e))?,
            None => default_fallback_rates(),
        };

        Ok(Self {
            origin_zip,
            default_parcel,
            fallback_rates,
        })
    }
}

fn lockout_policy_from_env() -> Result<LockoutPolicy, ConfigError> {
    let max_attempts: u32 = get_parsed_env("LOGIN_MAX_ATTEMPTS", "5")?;
    if max_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar(
            "LOGIN_MAX_ATTEMPTS".to_string(),
            "must be at least 1".to_string(),
        ));
    }
    let window_secs: u32 = get_parsed_env("LOGIN_ATTEMPT_WINDOW_SECS", "300")?;
    let lockout_secs: u32 = get_parsed_env("LOGIN_LOCKOUT_SECS", "900")?;

    Ok(LockoutPolicy {
        max_attempts,
        attempt_window: TimeDelta::seconds(i64::from(window_secs)),
        lockout_duration: TimeDelta::seconds(i64::from(lockout_secs)),
    })
}

/// Flat-rate table used when no override is configured.
#[must_use]
pub fn default_fallback_rates() -> Vec<ShippingQuote> {
    vec![
        ShippingQuote::new("Standard", Decimal::new(999, 2), TransitDays::new(5, 7)),
        ShippingQuote::new("Express", Decimal::new(1999, 2), TransitDays::new(2, 3)),
        ShippingQuote::new("Overnight", Decimal::new(3499, 2), TransitDays::new(1, 1)),
    ]
}

/// Parse a JSON fallback table, rejecting empty tables and negative costs.
fn parse_fallback_rates(json: &str) -> Result<Vec<ShippingQuote>, String> {
    let rates: Vec<ShippingQuote> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if rates.is_empty() {
        return Err("must contain at least one quote".to_string());
    }
    if let Some(bad) = rates.iter().find(|q| q.cost.is_sign_negative()) {
        return Err(format!("cost for '{}' is negative", bad.service_name));
    }
    Ok(rates)
}

/// Parse the carrier base URL and make sure its path ends with `/`.
fn normalize_base_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable (or default) parsed into `T`.
fn get_parsed_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn get_positive_decimal(key: &str, default: &str) -> Result<Decimal, ConfigError> {
    let value: Decimal = get_parsed_env(key, default)?;
    if value <= Decimal::ZERO {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the secret issued by the carrier."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
