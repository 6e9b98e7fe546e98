//! CLI command implementations.

pub mod shipping;
