//! Value Objects for the marketplace

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Money value object. Currency codes are kept lowercase, the form payment providers expect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_lowercase() }
    }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, "usd") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch);
        }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money {
        Money::new(self.amount * Decimal::from(qty), &self.currency)
    }

    /// Decimal places of the currency's smallest unit.
    pub fn exponent(&self) -> u32 {
        minor_unit_exponent(&self.currency)
    }

    /// Amount in the smallest currency unit, rounded half away from zero.
    pub fn minor_units(&self) -> Result<i64, MoneyError> {
        (self.amount * Decimal::from(10i64.pow(self.exponent())))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }
}

const ZERO_DECIMAL: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv", "xaf", "xof", "xpf",
];
const THREE_DECIMAL: &[&str] = &["bhd", "jod", "kwd", "omr", "tnd"];

/// Decimal places of the smallest unit for a lowercase ISO 4217 code.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    if ZERO_DECIMAL.contains(&currency) {
        0
    } else if THREE_DECIMAL.contains(&currency) {
        3
    } else {
        2
    }
}

impl Default for Money {
    fn default() -> Self { Self::zero("usd") }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("currency mismatch")]
    CurrencyMismatch,
    #[error("amount does not fit in minor units")]
    Overflow,
}
