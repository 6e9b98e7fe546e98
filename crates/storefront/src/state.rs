//! Application state shared across handlers.

use std::sync::Arc;

use aodai_core::{Clock, SystemClock};
use axum::extract::FromRef;

use crate::config::StorefrontConfig;
use crate::login_guard::GuardRegistry;
use crate::middleware::ProxyTrust;
use crate::shipping::{ShippingError, ShippingRateEstimator};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    shipping: ShippingRateEstimator,
    login_guards: GuardRegistry,
}

impl AppState {
    /// Create application state using wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns an error if the carrier HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ShippingError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create application state with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns an error if the carrier HTTP client cannot be built.
    pub fn with_clock(config: StorefrontConfig, clock: Arc<dyn Clock>) -> Result<Self, ShippingError> {
        let shipping =
            ShippingRateEstimator::with_clock(&config.carrier, &config.shipping, Arc::clone(&clock))?;
        let login_guards = GuardRegistry::new(config.login_guard, clock);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                shipping,
                login_guards,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the shipping rate estimator.
    #[must_use]
    pub fn shipping(&self) -> &ShippingRateEstimator {
        &self.inner.shipping
    }

    /// Get a reference to the per-client login guards.
    #[must_use]
    pub fn login_guards(&self) -> &GuardRegistry {
        &self.inner.login_guards
    }
}

impl FromRef<AppState> for ProxyTrust {
    fn from_ref(state: &AppState) -> Self {
        state.config().proxy_trust
    }
}
