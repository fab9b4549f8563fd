//! Cart Manager
//!
//! Every cart mutation runs in one transaction together with the matching ledger movement, so
//! `cart quantity + product quantity` stays constant across add, edit and remove.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::inventory::InventoryLedger;
use crate::domain::aggregates::{CartEntry, CartLine, CartView};
use crate::store::Store;
use crate::{MarketError, Result};

/// What adding a product that is already in the cart does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddPolicy {
    /// Leave the existing line untouched and reserve nothing.
    #[default]
    KeepExisting,
    /// Reserve the extra quantity and add it to the line.
    Merge,
}

impl fmt::Display for AddPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::KeepExisting => "keep_existing",
            Self::Merge => "merge",
        })
    }
}

impl FromStr for AddPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep_existing" => Ok(Self::KeepExisting),
            "merge" => Ok(Self::Merge),
            other => Err(format!("expected 'keep_existing' or 'merge', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    Added { quantity: u32 },
    AlreadyPresent { quantity: u32 },
    Merged { quantity: u32 },
}

impl AddOutcome {
    pub fn quantity(&self) -> u32 {
        match *self {
            Self::Added { quantity } | Self::AlreadyPresent { quantity } | Self::Merged { quantity } => quantity,
        }
    }
}

#[derive(Clone)]
pub struct CartManager {
    store: Arc<dyn Store>,
    policy: AddPolicy,
}

impl CartManager {
    pub fn new(store: Arc<dyn Store>, policy: AddPolicy) -> Self {
        Self { store, policy }
    }

    #[instrument(skip(self))]
    pub async fn add_to_cart(&self, user_id: &str, product_id: &str, quantity: u32) -> Result<AddOutcome> {
        if quantity == 0 {
            return Err(MarketError::Validation("quantity must be at least 1".to_string()));
        }
        let mut tx = self.store.begin().await?;

        if !tx.find_product(product_id).await?.is_some_and(|p| p.is_active()) {
            return Err(MarketError::not_found(format!("product {product_id}")));
        }

        let outcome = match tx.find_cart_line(user_id, product_id).await? {
            Some(line) if self.policy == AddPolicy::KeepExisting => {
                info!(user_id, product_id, "Product already in cart");
                return Ok(AddOutcome::AlreadyPresent { quantity: line.quantity });
            }
            Some(mut line) => {
                InventoryLedger::reserve_in(tx.as_mut(), product_id, quantity).await?;
                line.set_quantity(line.quantity + quantity);
                tx.update_cart_line(&line).await?;
                AddOutcome::Merged { quantity: line.quantity }
            }
            None => {
                InventoryLedger::reserve_in(tx.as_mut(), product_id, quantity).await?;
                tx.insert_cart_line(&CartLine::new(user_id, product_id, quantity)).await?;
                AddOutcome::Added { quantity }
            }
        };
        tx.commit().await?;

        info!(user_id, product_id, ?outcome, "Cart updated");
        Ok(outcome)
    }

    /// Sets a line to `new_quantity`, reserving or releasing only the difference.
    #[instrument(skip(self))]
    pub async fn edit_cart(&self, user_id: &str, product_id: &str, new_quantity: u32) -> Result<CartLine> {
        if new_quantity == 0 {
            return Err(MarketError::Validation("quantity must be at least 1; remove the line instead".to_string()));
        }
        let mut tx = self.store.begin().await?;

        let mut line = tx
            .find_cart_line(user_id, product_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("cart line for product {product_id}")))?;

        if new_quantity > line.quantity {
            InventoryLedger::reserve_in(tx.as_mut(), product_id, new_quantity - line.quantity).await?;
        } else if new_quantity < line.quantity {
            InventoryLedger::release_in(tx.as_mut(), product_id, line.quantity - new_quantity).await?;
        }

        let previous = line.quantity;
        line.set_quantity(new_quantity);
        tx.update_cart_line(&line).await?;
        tx.commit().await?;

        info!(user_id, product_id, previous, new_quantity, "Cart line edited");
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, user_id: &str, product_id: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let line = tx
            .find_cart_line(user_id, product_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("cart line for product {product_id}")))?;

        InventoryLedger::release_in(tx.as_mut(), product_id, line.quantity).await?;
        tx.delete_cart_line(user_id, product_id).await?;
        tx.commit().await?;

        info!(user_id, product_id, released = line.quantity, "Removed from cart");
        Ok(())
    }

    /// The user's cart joined with product and seller details.
    pub async fn get_cart(&self, user_id: &str) -> Result<CartView> {
        let mut tx = self.store.begin().await?;

        let mut entries = Vec::new();
        for line in tx.cart_lines(user_id).await? {
            let Some(product) = tx.find_product(&line.product_id).await? else { continue };
            let Some(seller) = tx.find_user(&product.seller_id).await? else { continue };
            entries.push(CartEntry {
                product_id: product.id,
                product_name: product.name,
                price: product.price,
                seller_email: seller.email,
                quantity: line.quantity,
                created_at: line.created_at,
                updated_at: line.updated_at,
            });
        }

        if entries.is_empty() {
            return Err(MarketError::not_found("cart"));
        }
        Ok(CartView::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use rust_decimal::Decimal;

    #[test]
    fn test_policy_parse() {
        assert_eq!("merge".parse::<AddPolicy>().unwrap(), AddPolicy::Merge);
        assert_eq!("Keep_Existing".parse::<AddPolicy>().unwrap(), AddPolicy::KeepExisting);
        assert!("replace".parse::<AddPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_add_reserves_stock() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 5).await;

        let outcome = fx.cart().add_to_cart(&fx.buyer.id, &p.id, 2).await.unwrap();
        assert_eq!(outcome, AddOutcome::Added { quantity: 2 });
        assert_eq!(fx.product_quantity(&p.id).await, 3);
        assert_eq!(fx.cart_quantity(&fx.buyer.id, &p.id).await, Some(2));
    }

    #[tokio::test]
    async fn test_second_add_keeps_existing_line() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 5).await;
        let cart = fx.cart();

        cart.add_to_cart(&fx.buyer.id, &p.id, 2).await.unwrap();
        let outcome = cart.add_to_cart(&fx.buyer.id, &p.id, 1).await.unwrap();

        assert_eq!(outcome, AddOutcome::AlreadyPresent { quantity: 2 });
        assert_eq!(fx.product_quantity(&p.id).await, 3);
        assert_eq!(fx.cart_quantity(&fx.buyer.id, &p.id).await, Some(2));
    }

    #[tokio::test]
    async fn test_merge_policy_adds_quantity() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 5).await;
        let cart = fx.cart_with(AddPolicy::Merge);

        cart.add_to_cart(&fx.buyer.id, &p.id, 2).await.unwrap();
        let outcome = cart.add_to_cart(&fx.buyer.id, &p.id, 3).await.unwrap();

        assert_eq!(outcome, AddOutcome::Merged { quantity: 5 });
        assert_eq!(fx.product_quantity(&p.id).await, 0);
    }

    #[tokio::test]
    async fn test_add_beyond_stock_leaves_no_line() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 1).await;

        let err = fx.cart().add_to_cart(&fx.buyer.id, &p.id, 2).await.unwrap_err();
        assert!(matches!(err, MarketError::InsufficientStock { .. }));
        assert_eq!(fx.cart_quantity(&fx.buyer.id, &p.id).await, None);
        assert_eq!(fx.product_quantity(&p.id).await, 1);
    }

    #[tokio::test]
    async fn test_quantity_is_conserved_across_mutations() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 10).await;
        let cart = fx.cart();

        cart.add_to_cart(&fx.buyer.id, &p.id, 4).await.unwrap();
        assert_eq!(fx.held_and_on_hand(&fx.buyer.id, &p.id).await, 10);
        cart.edit_cart(&fx.buyer.id, &p.id, 7).await.unwrap();
        assert_eq!(fx.held_and_on_hand(&fx.buyer.id, &p.id).await, 10);
        assert_eq!(fx.product_quantity(&p.id).await, 3);
        cart.edit_cart(&fx.buyer.id, &p.id, 1).await.unwrap();
        assert_eq!(fx.held_and_on_hand(&fx.buyer.id, &p.id).await, 10);
        assert_eq!(fx.product_quantity(&p.id).await, 9);
        cart.remove_from_cart(&fx.buyer.id, &p.id).await.unwrap();
        assert_eq!(fx.product_quantity(&p.id).await, 10);
        assert_eq!(fx.cart_quantity(&fx.buyer.id, &p.id).await, None);
    }

    #[tokio::test]
    async fn test_failed_edit_changes_nothing() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 3).await;
        let cart = fx.cart();
        cart.add_to_cart(&fx.buyer.id, &p.id, 2).await.unwrap();

        let err = cart.edit_cart(&fx.buyer.id, &p.id, 5).await.unwrap_err();
        assert!(matches!(err, MarketError::InsufficientStock { .. }));
        assert_eq!(fx.cart_quantity(&fx.buyer.id, &p.id).await, Some(2));
        assert_eq!(fx.product_quantity(&p.id).await, 1);
    }

    #[tokio::test]
    async fn test_missing_line_is_not_found() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 3).await;
        let cart = fx.cart();

        assert!(matches!(cart.edit_cart(&fx.buyer.id, &p.id, 1).await, Err(MarketError::NotFound(_))));
        assert!(matches!(cart.remove_from_cart(&fx.buyer.id, &p.id).await, Err(MarketError::NotFound(_))));
        assert!(matches!(cart.get_cart(&fx.buyer.id).await, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_cart_joins_product_and_seller() {
        let fx = Fixture::new().await;
        let a = fx.product(&fx.seller_a, "Widget", 10, 3).await;
        let b = fx.product(&fx.seller_b, "Gadget", 5, 3).await;
        let cart = fx.cart();
        cart.add_to_cart(&fx.buyer.id, &a.id, 2).await.unwrap();
        cart.add_to_cart(&fx.buyer.id, &b.id, 1).await.unwrap();

        let view = cart.get_cart(&fx.buyer.id).await.unwrap();
        assert_eq!(view.item_count(), 2);
        assert_eq!(view.subtotal, Decimal::new(25, 0));
        let gadget = view.entries.iter().find(|e| e.product_id == b.id).unwrap();
        assert_eq!(gadget.seller_email, "s2@example.com");
    }
}
