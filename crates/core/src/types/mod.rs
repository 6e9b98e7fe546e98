//! Core types for the Ao Dai storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod shipping;
pub mod zip_code;

pub use address::{Address, AddressValidation, Destination, DestinationError, ValidDestination};
pub use shipping::{PackageItem, Parcel, ParcelError, ShippingQuote, TransitDays};
pub use zip_code::{ZipCode, ZipCodeError};
