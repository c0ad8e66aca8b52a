//! Value Objects for the storefront

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::iter::Sum;
use thiserror::Error;

/// Whole currency units (rupees). Persisted as a bare JSON number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(amount: i64) -> Self { Self(amount) }
    pub fn amount(&self) -> i64 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
    pub fn saturating_sub(&self, other: Money) -> Money { Money(self.0.saturating_sub(other.0)) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(i64::from(qty))) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "₹{}", self.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self { iter.fold(Money::ZERO, |acc, m| acc.add(m)) }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        round_number(deserializer).map(Money)
    }
}

/// Accepts any JSON number and rounds it to a whole value.
///
/// Older blobs were written from free-text form fields and may carry
/// fractional prices or discounts.
pub fn round_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() {
        return Err(serde::de::Error::custom("amount must be finite"));
    }
    Ok(raw.round() as i64)
}

/// E-mail address value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl Into<String>) -> Result<Self, ContactError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(ContactError::EmptyEmail); }
        if !validator::validate_email(value.as_str()) { return Err(ContactError::InvalidEmail); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }

    /// E-mail comparison ignores ASCII case.
    pub fn matches(&self, other: &str) -> bool { self.0.eq_ignore_ascii_case(other.trim()) }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Ten-digit mobile number. Non-digit characters are stripped before checking.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    pub const DIGITS: usize = 10;

    pub fn parse(value: &str) -> Result<Self, ContactError> {
        let digits: String = value.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != Self::DIGITS { return Err(ContactError::InvalidPhone); }
        Ok(Self(digits))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Field-level check for `validator` derives.
pub fn validate_phone(phone: &str) -> Result<(), validator::ValidationError> {
    Phone::parse(phone).map(|_| ()).map_err(|_| validator::ValidationError::new("phone"))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("Email required")]
    EmptyEmail,
    #[error("Valid email required")]
    InvalidEmail,
    #[error("Valid 10-digit mobile number required")]
    InvalidPhone,
}
