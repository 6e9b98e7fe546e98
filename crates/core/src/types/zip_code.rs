//! US postal code type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ZipCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ZipCodeError {
    /// The input string is empty.
    #[error("ZIP code cannot be empty")]
    Empty,
    /// The first five characters are not all digits.
    #[error("ZIP code must start with 5 digits")]
    InvalidBase,
    /// The `+4` extension is malformed.
    #[error("ZIP+4 extension must be 4 digits")]
    InvalidExtension,
}

/// A US ZIP code, optionally carrying the `+4` extension.
///
/// ## Accepted forms
///
/// - `95127`
/// - `95127-1234`
/// - `951271234`
///
/// ## Examples
///
/// ```
/// use aodai_core::ZipCode;
///
/// let zip = ZipCode::parse("95127-1234").unwrap();
/// assert_eq!(zip.base(), "95127");
/// assert_eq!(zip.plus4(), Some("1234"));
///
/// assert!(ZipCode::parse("").is_err());
/// assert!(ZipCode::parse("9512").is_err());
/// assert!(ZipCode::parse("95127-12").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ZipCode {
    base: String,
    plus4: Option<String>,
}

impl ZipCode {
    /// Parse a `ZipCode` from a string, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, does not start with five
    /// digits, or carries an extension that is not exactly four digits.
    pub fn parse(s: &str) -> Result<Self, ZipCodeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ZipCodeError::Empty);
        }

        let (base, rest) = s.split_at_checked(5).ok_or(ZipCodeError::InvalidBase)?;
        if !is_digits(base, 5) {
            return Err(ZipCodeError::InvalidBase);
        }

        let extension = rest.strip_prefix('-').unwrap_or(rest);
        let plus4 = if extension.is_empty() {
            None
        } else if is_digits(extension, 4) {
            Some(extension.to_owned())
        } else {
            return Err(ZipCodeError::InvalidExtension);
        };

        Ok(Self {
            base: base.to_owned(),
            plus4,
        })
    }

    /// Returns the five-digit base code.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the `+4` extension, if present.
    #[must_use]
    pub fn plus4(&self) -> Option<&str> {
        self.plus4.as_deref()
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for ZipCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plus4 {
            Some(plus4) => write!(f, "{}-{plus4}", self.base),
            None => write!(f, "{}", self.base),
        }
    }
}

impl std::str::FromStr for ZipCode {
    type Err = ZipCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ZipCode {
    type Error = ZipCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ZipCode> for String {
    fn from(zip: ZipCode) -> Self {
        zip.to_string()
    }
}
