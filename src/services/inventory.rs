//! Inventory Ledger
//!
//! Stock moves between a product's on-hand quantity and the carts holding it. A reservation is
//! one conditional decrement (`quantity >= qty`); losing a race surfaces as
//! [`MarketError::InsufficientStock`] and is never retried here.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::store::{Store, Transaction};
use crate::{MarketError, Result};

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reserves stock in a transaction of its own.
    #[instrument(skip(self))]
    pub async fn reserve(&self, product_id: &str, qty: u32) -> Result<()> {
        let mut tx = self.store.begin().await?;
        Self::reserve_in(tx.as_mut(), product_id, qty).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Releases stock in a transaction of its own.
    #[instrument(skip(self))]
    pub async fn release(&self, product_id: &str, qty: u32) -> Result<()> {
        let mut tx = self.store.begin().await?;
        Self::release_in(tx.as_mut(), product_id, qty).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn reserve_in(tx: &mut dyn Transaction, product_id: &str, qty: u32) -> Result<()> {
        if qty == 0 {
            return Err(MarketError::Validation("quantity must be at least 1".to_string()));
        }
        if tx.try_decrement_stock(product_id, qty).await? {
            debug!(product_id, qty, "Stock reserved");
            return Ok(());
        }
        match tx.find_product(product_id).await? {
            Some(product) if product.is_active() => {
                warn!(product_id, requested = qty, available = product.quantity, "Reservation refused");
                Err(MarketError::InsufficientStock { product_id: product_id.to_string() })
            }
            _ => Err(MarketError::not_found(format!("product {product_id}"))),
        }
    }

    pub async fn release_in(tx: &mut dyn Transaction, product_id: &str, qty: u32) -> Result<()> {
        if qty == 0 {
            return Ok(());
        }
        if !tx.increment_stock(product_id, qty).await? {
            return Err(MarketError::not_found(format!("product {product_id}")));
        }
        debug!(product_id, qty, "Stock released");
        Ok(())
    }
}
