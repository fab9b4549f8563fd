//! Notification dispatch.
//!
//! Sending is best-effort from the core's point of view: callers log failures and move on.

pub mod log;
pub mod nats;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::events::{ItemSummary, NotificationEvent};

pub use self::log::LogNotifier;
pub use self::nats::NatsNotifier;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish notification: {0}")]
    Publish(String),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, event: NotificationEvent) -> Result<(), NotifyError>;

    async fn notify_buyer_order_confirmed(&self, email: &str, items: &[ItemSummary], total: Decimal) -> Result<(), NotifyError> {
        self.send(NotificationEvent::BuyerOrderConfirmed { to: email.to_string(), items: items.to_vec(), total }).await
    }

    async fn notify_seller_new_order(
        &self,
        email: &str,
        buyer_email: &str,
        items: &[ItemSummary],
        total: Decimal,
    ) -> Result<(), NotifyError> {
        self.send(NotificationEvent::SellerNewOrder {
            to: email.to_string(),
            buyer_email: buyer_email.to_string(),
            items: items.to_vec(),
            total,
        })
        .await
    }

    async fn notify_buyer_delivered(&self, email: &str, seller_email: &str) -> Result<(), NotifyError> {
        self.send(NotificationEvent::BuyerDelivered { to: email.to_string(), seller_email: seller_email.to_string() }).await
    }
}
