//! Order Aggregate
//!
//! One order per (payment, seller). Orders move `pending -> confirmed -> delivered` and are
//! never deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub seller_id: String,
    pub user_id: String,
    pub payment_id: String,
    pub items: Vec<OrderItem>,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a purchased product, taken at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Delivered => "delivered",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "delivered" => Ok(Self::Delivered),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

impl Order {
    pub fn pending(
        seller_id: impl Into<String>,
        user_id: impl Into<String>,
        payment_id: impl Into<String>,
        items: Vec<OrderItem>,
    ) -> Self {
        let now = Utc::now();
        let total_price = items.iter().map(OrderItem::line_total).sum();
        Self {
            id: Uuid::now_v7().to_string(),
            seller_id: seller_id.into(),
            user_id: user_id.into(),
            payment_id: payment_id.into(),
            items,
            total_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Pending, OrderStatus::Confirmed) }
    pub fn deliver(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Confirmed, OrderStatus::Delivered) }

    fn transition(&mut self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.status != from {
            return Err(OrderError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
