//! Domain events
//!
//! Notification events are what the core hands to the delivery side (email worker, message bus).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::OrderItem;

/// One purchased line as shown in confirmation messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub quantity: u32,
    pub product_name: String,
    pub product_price: Decimal,
}

impl From<&OrderItem> for ItemSummary {
    fn from(item: &OrderItem) -> Self {
        Self { quantity: item.quantity, product_name: item.name.clone(), product_price: item.unit_price }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    BuyerOrderConfirmed { to: String, items: Vec<ItemSummary>, total: Decimal },
    SellerNewOrder { to: String, buyer_email: String, items: Vec<ItemSummary>, total: Decimal },
    BuyerDelivered { to: String, seller_email: String },
}

impl NotificationEvent {
    pub fn recipient(&self) -> &str {
        match self {
            Self::BuyerOrderConfirmed { to, .. } | Self::SellerNewOrder { to, .. } | Self::BuyerDelivered { to, .. } => to,
        }
    }

    /// Subject suffix used when the event is published on a message bus.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::BuyerOrderConfirmed { .. } => "buyer_order_confirmed",
            Self::SellerNewOrder { .. } => "seller_new_order",
            Self::BuyerDelivered { .. } => "buyer_delivered",
        }
    }
}
