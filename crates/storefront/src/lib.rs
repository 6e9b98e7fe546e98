//! Ao Dai Boutique storefront library.
//!
//! Checkout shipping quotes from the carrier's live pricing API with a
//! static fallback table, carrier address validation, and a login attempt
//! guard that locks a client out after repeated failed sign-ins.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod login_guard;
pub mod middleware;
pub mod routes;
pub mod shipping;
pub mod state;
