//! Ao Dai Core - Shared types library.
//!
//! This crate provides common types used across the Ao Dai storefront components:
//! - `storefront` - Public-facing API (login guard, shipping estimates)
//! - `cli` - Command-line tools for carrier diagnostics
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Addresses, ZIP codes, parcels, and shipping quotes
//! - [`clock`] - Injectable time source used by expiry logic

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::*;
