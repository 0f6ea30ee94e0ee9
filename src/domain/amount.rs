//! Money types
//!
//! Domain primitives for monetary values. Values are held as integer cents so
//! ledger arithmetic is exact; `Decimal` is only used at the database and wire
//! boundaries.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fractional digits kept for every monetary value
const SCALE: u32 = 2;

/// Largest value a NUMERIC(12,2) column holds, in cents
const MAX_CENTS: i64 = 999_999_999_999;

/// Errors that can occur when building a monetary value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Balance cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

/// Convert a decimal into cents, rejecting sub-cent precision.
fn to_cents(value: Decimal) -> Result<i64, AmountError> {
    let normalized = value.normalize();
    if normalized.scale() > SCALE {
        return Err(AmountError::TooManyDecimals(normalized.scale()));
    }

    let cents = normalized
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.to_i64())
        .ok_or(AmountError::Overflow)?;

    if cents.abs() > MAX_CENTS {
        return Err(AmountError::Overflow);
    }

    Ok(cents)
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, SCALE)
}

/// Amount is the magnitude of a money movement.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 2 decimal places
/// - Fits a NUMERIC(12,2) column
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use transfer_service::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(10050, 2)).unwrap();
/// assert_eq!(amount.cents(), 10050);
/// assert_eq!(amount.to_string(), "100.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value does not fit the ledger columns
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        to_cents(value).map(Self)
    }

    /// Create an Amount from integer cents.
    pub fn from_cents(cents: i64) -> Result<Self, AmountError> {
        if cents <= 0 {
            return Err(AmountError::NotPositive(from_cents(cents)));
        }
        if cents > MAX_CENTS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Get the value as a two-digit Decimal.
    pub fn value(&self) -> Decimal {
        from_cents(self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Amount::new(value).map_err(serde::de::Error::custom)
    }
}

/// Balance is the amount of money held by an account.
/// Unlike Amount, Balance can be zero, but never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(value));
        }
        to_cents(value).map(Self)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn from_cents(cents: i64) -> Result<Self, AmountError> {
        if cents < 0 {
            return Err(AmountError::Negative(from_cents(cents)));
        }
        if cents > MAX_CENTS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn value(&self) -> Decimal {
        from_cents(self.0)
    }

    /// Check if balance covers a withdrawal of `amount`
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.0
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        let cents = self.0.checked_add(amount.0).ok_or(AmountError::Overflow)?;
        Balance::from_cents(cents)
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::from_cents(self.0 - amount.0)
    }

    /// Signed difference `self - earlier`, as a Decimal
    pub fn change_since(&self, earlier: &Balance) -> Decimal {
        from_cents(self.0 - earlier.0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Balance::new(value).map_err(serde::de::Error::custom)
    }
}
