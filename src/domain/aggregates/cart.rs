//! Cart Aggregate
//!
//! A cart is the set of lines a user holds. Every line's quantity is reserved stock: it has
//! already been taken off the product's on-hand quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(user_id: impl Into<String>, product_id: impl Into<String>, quantity: u32) -> Self {
        let now = Utc::now();
        Self { user_id: user_id.into(), product_id: product_id.into(), quantity, created_at: now, updated_at: now }
    }

    pub fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.updated_at = Utc::now();
    }
}

/// A cart line joined with its product and seller, for display.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartEntry {
    pub product_id: String,
    pub product_name: String,
    pub price: Decimal,
    pub seller_email: String,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartEntry {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartView {
    pub entries: Vec<CartEntry>,
    pub subtotal: Decimal,
}

impl CartView {
    pub fn new(entries: Vec<CartEntry>) -> Self {
        let subtotal = entries.iter().map(CartEntry::line_total).sum();
        Self { entries, subtotal }
    }

    pub fn item_count(&self) -> usize { self.entries.len() }
}
