//! Payment Aggregate
//!
//! One payment per checkout attempt. A pending payment that is never completed stays pending.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    /// Identifier assigned by the payment gateway.
    pub payment_id: String,
    pub payment_method: PaymentMethod,
    /// Amount charged, in major units.
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    PaymentIntent,
    PaymentLink,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Confirmed,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentIntent => "payment_intent",
            Self::PaymentLink => "payment_link",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_intent" => Ok(Self::PaymentIntent),
            "payment_link" => Ok(Self::PaymentLink),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

impl Payment {
    pub fn pending(
        user_id: impl Into<String>,
        payment_id: impl Into<String>,
        payment_method: PaymentMethod,
        amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            payment_id: payment_id.into(),
            payment_method,
            amount,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool { self.status == PaymentStatus::Pending }

    pub fn confirm(&mut self) -> Result<(), PaymentError> {
        if !self.is_pending() {
            return Err(PaymentError::AlreadyConfirmed);
        }
        self.status = PaymentStatus::Confirmed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("payment already confirmed")]
    AlreadyConfirmed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_confirm_once() {
        let mut p = Payment::pending("U1", "pi_1", PaymentMethod::PaymentIntent, Decimal::new(25, 0));
        p.confirm().unwrap();
        assert_eq!(p.status, PaymentStatus::Confirmed);
        assert_eq!(p.confirm(), Err(PaymentError::AlreadyConfirmed));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("payment_link".parse::<PaymentMethod>().unwrap(), PaymentMethod::PaymentLink);
        assert!("cash".parse::<PaymentMethod>().is_err());
    }
}
