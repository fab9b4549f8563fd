//! Product Aggregate

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    /// On-hand stock not currently reserved by any cart.
    pub quantity: u32,
    pub images: Vec<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(
        seller_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
        quantity: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            seller_id: seller_id.into(),
            name: name.into(),
            description: description.into(),
            price,
            quantity,
            images: vec![],
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self) -> bool { self.quantity > 0 }
    pub fn is_active(&self) -> bool { !self.is_deleted }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), ProductError> {
        if self.is_deleted {
            return Err(ProductError::AlreadyDeleted);
        }
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn restore(&mut self, now: DateTime<Utc>, window: Duration) -> Result<(), ProductError> {
        if !self.is_deleted {
            return Err(ProductError::NotDeleted);
        }
        if let Some(deleted_at) = self.deleted_at {
            if now - deleted_at > window {
                return Err(ProductError::RestoreWindowExpired);
            }
        }
        self.is_deleted = false;
        self.deleted_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the sweep may hard-delete this product.
    pub fn is_purgeable(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_deleted && self.deleted_at.is_some_and(|at| at <= cutoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("product is already deleted")]
    AlreadyDeleted,
    #[error("product is not deleted")]
    NotDeleted,
    #[error("the restore window has expired")]
    RestoreWindowExpired,
}
