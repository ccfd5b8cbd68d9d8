//! Hours: the unit of exchange.
//!
//! Hours are exact decimals (never floats). They travel over JSON as strings
//! such as `"2.5"` and are stored as `NUMERIC` columns.

use crate::error::DomainError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Upper bound for a single booking.
pub const MAX_BOOKING_HOURS: u32 = 999;

/// Maximum number of fractional digits accepted from clients.
const MAX_SCALE: u32 = 2;

/// An exact, possibly negative, number of hours.
///
/// Balances use the full signed range; amounts coming from clients go
/// through [`Hours::positive`] or [`Hours::booking_hours`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hours(Decimal);

impl Hours {
    /// Zero hours.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wraps a decimal.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Whole hours.
    #[must_use]
    pub fn whole(hours: i64) -> Self {
        Self(Decimal::from(hours))
    }

    /// Returns the inner decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Approximate value, for metrics.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// True when strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// True when strictly below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Validates a client supplied amount: strictly positive, at most two
    /// fractional digits.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] naming `field` when the amount is
    /// zero, negative or too precise.
    pub fn positive(self, field: &'static str) -> Result<Self, DomainError> {
        if !self.is_positive() {
            return Err(DomainError::validation(field, "must be greater than 0"));
        }
        if self.0.normalize().scale() > MAX_SCALE {
            return Err(DomainError::validation(
                field,
                "must have at most two decimal places",
            ));
        }
        Ok(Self(self.0.normalize()))
    }

    /// Validates the hours of a booking: positive and no more than
    /// [`MAX_BOOKING_HOURS`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] on the `hours` field.
    pub fn booking_hours(self) -> Result<Self, DomainError> {
        let hours = self.positive("hours")?;
        if hours.0 > Decimal::from(MAX_BOOKING_HOURS) {
            return Err(DomainError::validation(
                "hours",
                format!("must not exceed {MAX_BOOKING_HOURS}"),
            ));
        }
        Ok(hours)
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Hours {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self)
    }
}

impl From<Decimal> for Hours {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Hours {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Hours {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Hours {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Hours {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Hours {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn h(s: &str) -> Hours {
        s.parse().unwrap()
    }

    #[test]
    fn booking_hours_bounds() {
        assert!(h("0").booking_hours().is_err());
        assert!(h("-1").booking_hours().is_err());
        assert!(h("999").booking_hours().is_ok());
        assert!(h("999.01").booking_hours().is_err());
        assert_eq!(h("1.50").booking_hours().unwrap(), h("1.5"));
    }

    #[test]
    fn rejects_excess_precision() {
        let err = h("0.125").positive("amount").unwrap_err();
        assert!(err.to_string().contains("decimal places"));
    }

    #[test]
    fn arithmetic_is_exact() {
        let total: Hours = ["0.1", "0.2", "0.7"].into_iter().map(h).sum();
        assert_eq!(total, Hours::whole(1));
        assert_eq!(h("2") - h("5"), h("-3"));
    }

    #[test]
    fn json_accepts_strings_and_numbers() {
        let from_str: Hours = serde_json::from_str("\"2.5\"").unwrap();
        let from_num: Hours = serde_json::from_str("2.5").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(serde_json::to_string(&from_str).unwrap(), "\"2.5\"");
    }
}
