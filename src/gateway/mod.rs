//! Payment gateway abstraction.
//!
//! The core only needs to create payment objects and ask for their status; everything else
//! about money movement belongs to the provider.

pub mod mock;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::PaymentMethod;
use crate::domain::value_objects::{Money, MoneyError};

pub use mock::MockGateway;
pub use stripe::StripeGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkLineItem {
    pub price_id: String,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Succeeded,
    Pending,
    Failed,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, amount: &Money) -> GatewayResult<PaymentIntent>;

    /// Registers a one-off price for a line and returns the provider's price id.
    async fn create_price_line(&self, unit_amount: &Money, name: &str) -> GatewayResult<String>;

    async fn create_payment_link(&self, line_items: &[LinkLineItem]) -> GatewayResult<PaymentLink>;

    /// Points the link's post-completion redirect at `url`.
    async fn set_redirect(&self, link_id: &str, url: &str) -> GatewayResult<()>;

    async fn get_status(&self, method: PaymentMethod, payment_id: &str) -> GatewayResult<GatewayStatus>;
}
