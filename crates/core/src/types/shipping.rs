//! Shipping quote and parcel types.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inclusive range of business days a service takes to deliver.
///
/// Serializes as a two-element array, e.g. `[5, 7]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u16, u16)", into = "(u16, u16)")]
pub struct TransitDays {
    min: u16,
    max: u16,
}

impl TransitDays {
    /// Create a range, swapping the bounds if given in the wrong order.
    #[must_use]
    pub const fn new(min: u16, max: u16) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    #[must_use]
    pub const fn min(self) -> u16 {
        self.min
    }

    #[must_use]
    pub const fn max(self) -> u16 {
        self.max
    }
}

impl From<(u16, u16)> for TransitDays {
    fn from((min, max): (u16, u16)) -> Self {
        Self::new(min, max)
    }
}

impl From<TransitDays> for (u16, u16) {
    fn from(days: TransitDays) -> Self {
        (days.min, days.max)
    }
}

impl fmt::Display for TransitDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            let unit = if self.min == 1 { "day" } else { "days" };
            write!(f, "{} {unit}", self.min)
        } else {
            write!(f, "{}-{} days", self.min, self.max)
        }
    }
}

/// One service level offered for a shipment (immutable value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuote {
    /// Customer-facing service name, e.g. "Standard".
    pub service_name: String,
    /// Cost in USD.
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub estimated_days: TransitDays,
    /// Carrier service code for live quotes (e.g. `USPS_GROUND_ADVANTAGE`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_service: Option<String>,
}

impl ShippingQuote {
    #[must_use]
    pub fn new(service_name: impl Into<String>, cost: Decimal, estimated_days: TransitDays) -> Self {
        Self {
            service_name: service_name.into(),
            cost,
            estimated_days,
            carrier_service: None,
        }
    }
}

/// A cart line as far as shipping is concerned.
///
/// Weight is in pounds; dimensions are in inches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageItem {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub weight: Option<Decimal>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub length: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub width: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub height: Option<Decimal>,
}

const fn default_quantity() -> u32 {
    1
}

impl PackageItem {
    /// An item with only a weight, quantity one.
    #[must_use]
    pub const fn with_weight(weight: Decimal) -> Self {
        Self {
            weight: Some(weight),
            quantity: 1,
            length: None,
            width: None,
            height: None,
        }
    }
}

/// Errors produced when a cart cannot be packed into one parcel.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelError {
    /// Weight times quantity, summed over the cart, does not fit a decimal.
    #[error("cart weight is too large to ship")]
    WeightOverflow,
    /// Stacked item heights do not fit a decimal.
    #[error("stacked package height is too large to ship")]
    HeightOverflow,
}

/// Estimated package sent to the carrier for pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    /// Pounds.
    pub weight: Decimal,
    /// Inches.
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
}

impl Parcel {
    /// Estimate a single package holding every item.
    ///
    /// Weight is the sum of `weight * quantity`; items without a weight add
    /// nothing. When the total is not positive the default weight is used.
    /// Dimensions come from the items only when every item carries all three
    /// (longest length, widest width, stacked heights); otherwise the
    /// defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError`] when the cart's totals overflow, which only
    /// happens for absurd weights or quantities.
    pub fn estimate(items: &[PackageItem], defaults: &Self) -> Result<Self, ParcelError> {
        let mut total_weight = Decimal::ZERO;
        for item in items {
            let Some(weight) = item.weight else {
                continue;
            };
            let line = weight
                .checked_mul(Decimal::from(item.quantity))
                .ok_or(ParcelError::WeightOverflow)?;
            if line.is_sign_positive() {
                total_weight = total_weight
                    .checked_add(line)
                    .ok_or(ParcelError::WeightOverflow)?;
            }
        }

        let weight = if total_weight > Decimal::ZERO {
            total_weight
        } else {
            defaults.weight
        };

        let dimensions: Option<Vec<(Decimal, Decimal, Decimal, u32)>> = items
            .iter()
            .map(|item| Some((item.length?, item.width?, item.height?, item.quantity)))
            .collect();

        match dimensions {
            Some(dims) if !dims.is_empty() => {
                let height = dims
                    .iter()
                    .try_fold(Decimal::ZERO, |stack, &(_, _, h, quantity)| {
                        h.checked_mul(Decimal::from(quantity))
                            .and_then(|item_stack| stack.checked_add(item_stack))
                    })
                    .ok_or(ParcelError::HeightOverflow)?;

                Ok(Self {
                    weight,
                    length: dims.iter().map(|d| d.0).max().unwrap_or(defaults.length),
                    width: dims.iter().map(|d| d.1).max().unwrap_or(defaults.width),
                    height,
                })
            }
            _ => Ok(Self { weight, ..*defaults }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn d(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    fn defaults() -> Parcel {
        Parcel {
            weight: Decimal::from(1),
            length: Decimal::from(12),
            width: Decimal::from(9),
            height: Decimal::from(3),
        }
    }

    #[test]
    fn test_transit_days_orders_bounds() {
        let days = TransitDays::new(7, 5);
        assert_eq!((days.min(), days.max()), (5, 7));
        assert_eq!(days.to_string(), "5-7 days");
        assert_eq!(TransitDays::new(1, 1).to_string(), "1 day");
    }

    #[test]
    fn test_quote_serializes_cost_as_number() {
        let quote = ShippingQuote::new("Standard", d(999, 2), TransitDays::new(5, 7));
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "serviceName": "Standard",
                "cost": 9.99,
                "estimatedDays": [5, 7]
            })
        );
    }

    #[test]
    fn test_estimate_without_items_uses_defaults() {
        assert_eq!(Parcel::estimate(&[], &defaults()).unwrap(), defaults());
    }

    #[test]
    fn test_estimate_sums_weight_times_quantity() {
        let items = vec![
            PackageItem {
                quantity: 3,
                ..PackageItem::with_weight(d(5, 1))
            },
            PackageItem::with_weight(Decimal::from(2)),
        ];
        let parcel = Parcel::estimate(&items, &defaults()).unwrap();
        assert_eq!(parcel.weight, d(35, 1));
        assert_eq!(parcel.length, Decimal::from(12));
    }

    #[test]
    fn test_estimate_ignores_missing_and_negative_weights() {
        let items = vec![
            PackageItem {
                weight: None,
                quantity: 1,
                length: None,
                width: None,
                height: None,
            },
            PackageItem::with_weight(Decimal::from(-4)),
        ];
        assert_eq!(
            Parcel::estimate(&items, &defaults()).unwrap().weight,
            Decimal::from(1)
        );
    }

    #[test]
    fn test_estimate_uses_item_dimensions_when_all_present() {
        let item = |l, w, h, q| PackageItem {
            weight: Some(Decimal::from(1)),
            quantity: q,
            length: Some(l),
            width: Some(w),
            height: Some(h),
        };
        let items = vec![
            item(Decimal::from(14), Decimal::from(10), Decimal::from(2), 2),
            item(Decimal::from(10), Decimal::from(11), Decimal::from(1), 1),
        ];
        let parcel = Parcel::estimate(&items, &defaults()).unwrap();
        assert_eq!(parcel.length, Decimal::from(14));
        assert_eq!(parcel.width, Decimal::from(11));
        assert_eq!(parcel.height, Decimal::from(5));
        assert_eq!(parcel.weight, Decimal::from(3));
    }

    #[test]
    fn test_package_item_deserializes_with_defaults() {
        let item: PackageItem = serde_json::from_str(r#"{"weight": 2}"#).unwrap();
        assert_eq!(item, PackageItem::with_weight(Decimal::from(2)));
    }

    #[test]
    fn test_estimate_rejects_overflowing_weight() {
        let items: Vec<PackageItem> =
            serde_json::from_str(r#"[{"weight": 1e20, "quantity": 4294967295}]"#).unwrap();
        assert_eq!(
            Parcel::estimate(&items, &defaults()),
            Err(ParcelError::WeightOverflow)
        );

        let heavy = PackageItem::with_weight(Decimal::MAX);
        assert_eq!(
            Parcel::estimate(&[heavy.clone(), heavy], &defaults()),
            Err(ParcelError::WeightOverflow)
        );
    }

    #[test]
    fn test_estimate_rejects_overflowing_height() {
        let item = PackageItem {
            weight: Some(Decimal::ONE),
            quantity: u32::MAX,
            length: Some(Decimal::from(10)),
            width: Some(Decimal::from(10)),
            height: Some(Decimal::MAX),
        };
        assert_eq!(
            Parcel::estimate(&[item], &defaults()),
            Err(ParcelError::HeightOverflow)
        );
    }
}
