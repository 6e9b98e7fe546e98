//! Shipping addresses and checkout destinations.

use serde::{Deserialize, Serialize};

use super::zip_code::{ZipCode, ZipCodeError};

/// Errors produced when a checkout destination is incomplete.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// A required field is missing or blank.
    #[error("destination is missing required field `{0}`")]
    MissingField(&'static str),
    /// The ZIP code is present but malformed.
    #[error("destination zipCode is invalid: {0}")]
    InvalidZip(#[from] ZipCodeError),
}

/// Where a checkout wants its order shipped.
///
/// Fields are plain strings so that a partially filled checkout form still
/// deserializes; call [`Destination::validate`] before using it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
}

/// A destination whose required fields have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDestination {
    pub zip_code: ZipCode,
    pub city: String,
    pub state: String,
}

impl Destination {
    /// Check that ZIP code, city, and state are all present.
    ///
    /// # Errors
    ///
    /// Returns [`DestinationError::MissingField`] for the first blank field
    /// (checked in the order `zipCode`, `city`, `state`) and
    /// [`DestinationError::InvalidZip`] when the ZIP code does not parse.
    pub fn validate(&self) -> Result<ValidDestination, DestinationError> {
        let zip = required(&self.zip_code, "zipCode")?;
        let city = required(&self.city, "city")?;
        let state = required(&self.state, "state")?;

        Ok(ValidDestination {
            zip_code: ZipCode::parse(zip)?,
            city: city.to_owned(),
            state: state.to_uppercase(),
        })
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, DestinationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(DestinationError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

/// A full street address, as submitted for carrier validation or returned
/// normalized by the carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_address: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_plus4: Option<String>,
}

/// Outcome of a carrier address-validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressValidation {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Address>,
}

impl AddressValidation {
    /// The carrier could not match the address to a deliverable point.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            is_valid: false,
            normalized: None,
            suggestions: Vec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn san_jose() -> Destination {
        Destination {
            zip_code: "95127".to_string(),
            city: "San Jose".to_string(),
            state: "ca".to_string(),
            street_address: None,
        }
    }

    #[test]
    fn test_validate_complete_destination() {
        let valid = san_jose().validate().unwrap();
        assert_eq!(valid.zip_code.base(), "95127");
        assert_eq!(valid.city, "San Jose");
        assert_eq!(valid.state, "CA");
    }

    #[test]
    fn test_validate_missing_zip() {
        let destination = Destination {
            zip_code: "  ".to_string(),
            ..san_jose()
        };
        assert_eq!(
            destination.validate(),
            Err(DestinationError::MissingField("zipCode"))
        );
    }

    #[test]
    fn test_validate_missing_city_and_state() {
        let no_city = Destination {
            city: String::new(),
            ..san_jose()
        };
        assert_eq!(
            no_city.validate(),
            Err(DestinationError::MissingField("city"))
        );

        let no_state = Destination {
            state: String::new(),
            ..san_jose()
        };
        assert_eq!(
            no_state.validate(),
            Err(DestinationError::MissingField("state"))
        );
    }

    #[test]
    fn test_validate_bad_zip() {
        let destination = Destination {
            zip_code: "ABCDE".to_string(),
            ..san_jose()
        };
        assert!(matches!(
            destination.validate(),
            Err(DestinationError::InvalidZip(_))
        ));
    }

    #[test]
    fn test_destination_deserializes_with_missing_fields() {
        let destination: Destination =
            serde_json::from_str(r#"{"city": "San Jose", "state": "CA"}"#).unwrap();
        assert!(destination.zip_code.is_empty());
        assert_eq!(
            destination.validate(),
            Err(DestinationError::MissingField("zipCode"))
        );
    }

    #[test]
    fn test_address_validation_serializes_camel_case() {
        let json = serde_json::to_value(AddressValidation::invalid()).unwrap();
        assert_eq!(json, serde_json::json!({ "isValid": false }));
    }
}
