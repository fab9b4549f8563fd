//! Order Splitter
//!
//! Groups checkout lines by seller. Pure: no I/O, and the result never depends on how the
//! lines were ordered beyond keeping first-seen seller order.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::domain::aggregates::{Order, OrderItem, Product};

/// A cart line joined with the live product it refers to.
#[derive(Clone, Debug)]
pub struct CheckoutLine {
    pub product: Product,
    pub quantity: u32,
}

impl CheckoutLine {
    pub fn new(product: Product, quantity: u32) -> Self {
        Self { product, quantity }
    }

    /// Snapshot of the product as it is sold in this line.
    pub fn to_item(&self) -> OrderItem {
        OrderItem {
            product_id: self.product.id.clone(),
            name: self.product.name.clone(),
            unit_price: self.product.price,
            quantity: self.quantity,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SellerGroup {
    pub seller_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SellerSplit {
    groups: Vec<SellerGroup>,
}

impl SellerSplit {
    pub fn split(lines: &[CheckoutLine]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<SellerGroup> = Vec::new();

        for line in lines {
            let item = line.to_item();
            let slot = *index.entry(line.product.seller_id.as_str()).or_insert_with(|| {
                groups.push(SellerGroup {
                    seller_id: line.product.seller_id.clone(),
                    items: Vec::new(),
                    subtotal: Decimal::ZERO,
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            group.subtotal += item.line_total();
            group.items.push(item);
        }

        Self { groups }
    }

    pub fn groups(&self) -> &[SellerGroup] { &self.groups }

    pub fn is_empty(&self) -> bool { self.groups.is_empty() }

    /// Sum of every seller subtotal; the amount to charge.
    pub fn total_amount(&self) -> Decimal {
        self.groups.iter().map(|g| g.subtotal).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &OrderItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }

    /// One pending order per seller, all sharing `payment_id`.
    pub fn to_orders(&self, user_id: &str, payment_id: &str) -> Vec<Order> {
        self.groups
            .iter()
            .map(|g| Order::pending(&g.seller_id, user_id, payment_id, g.items.clone()))
            .collect()
    }
}
