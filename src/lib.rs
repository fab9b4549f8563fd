//! MarketShop Marketplace Backend
//!
//! Multi-seller marketplace where stock is reserved the moment a buyer puts it in a cart.
//!
//! ## Features
//! - Inventory ledger with conditional stock reservation
//! - Per-user shopping carts built on the ledger
//! - Checkout split into one order per seller
//! - Payment intents and hosted payment links
//! - Payment reconciliation with seller and buyer notifications
//! - Product catalog with soft delete and a restore window

pub mod api;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod jobs;
pub mod notify;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

use serde::Serialize;
use thiserror::Error;

pub use gateway::GatewayError;
pub use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("payment {0} has not completed")]
    PaymentIncomplete(String),

    #[error("payment {0} was already processed")]
    AlreadyProcessed(String),

    #[error("invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: String,
        to: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Stable, client-facing error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InsufficientStock,
    Unauthorized,
    PaymentIncomplete,
    AlreadyProcessed,
    InvalidTransition,
    Validation,
    GatewayError,
    Internal,
}

impl MarketError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::PaymentIncomplete(_) => ErrorKind::PaymentIncomplete,
            Self::AlreadyProcessed(_) => ErrorKind::AlreadyProcessed,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Gateway(_) => ErrorKind::GatewayError,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
