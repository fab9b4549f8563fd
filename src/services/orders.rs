//! Order queries for buyers and sellers.
//!
//! Pending orders belong to an unfinished checkout and are never shown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::{Order, OrderItem, OrderStatus, Role, User};
use crate::store::{OrderParty, Store, Transaction};
use crate::{MarketError, Result};

/// An order as seen by one of its two parties.
#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    pub id: String,
    pub payment_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_price: Decimal,
    /// Side of the order the viewer is on.
    pub role: Role,
    /// Email of the other party: the seller for a buyer, the buyer for a seller.
    pub counterparty_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OrderQueries {
    store: Arc<dyn Store>,
}

impl OrderQueries {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<OrderView>> {
        let mut tx = self.store.begin().await?;
        let viewer = find_viewer(tx.as_mut(), user_id).await?;
        let party = match viewer.role() {
            Role::Buyer => OrderParty::Buyer(viewer.id.clone()),
            Role::Seller => OrderParty::Seller(viewer.id.clone()),
        };

        let mut views = Vec::new();
        for order in tx.list_orders(&party).await? {
            if order.status != OrderStatus::Pending {
                views.push(view(tx.as_mut(), &viewer, order).await?);
            }
        }
        if views.is_empty() {
            return Err(MarketError::not_found("orders"));
        }
        Ok(views)
    }

    pub async fn get_order(&self, user_id: &str, order_id: &str) -> Result<OrderView> {
        let mut tx = self.store.begin().await?;
        let viewer = find_viewer(tx.as_mut(), user_id).await?;

        let order = tx
            .find_order(order_id)
            .await?
            .filter(|o| o.status != OrderStatus::Pending)
            .filter(|o| match viewer.role() {
                Role::Buyer => o.user_id == viewer.id,
                Role::Seller => o.seller_id == viewer.id,
            })
            .ok_or_else(|| MarketError::not_found(format!("order {order_id}")))?;
        view(tx.as_mut(), &viewer, order).await
    }
}

async fn find_viewer(tx: &mut dyn Transaction, user_id: &str) -> Result<User> {
    tx.find_user(user_id).await?.ok_or_else(|| MarketError::Unauthorized(format!("unknown user {user_id}")))
}

async fn view(tx: &mut dyn Transaction, viewer: &User, order: Order) -> Result<OrderView> {
    let role = viewer.role();
    let counterparty = match role {
        Role::Buyer => &order.seller_id,
        Role::Seller => &order.user_id,
    };
    let counterparty_email = tx.find_user(counterparty).await?.map(|u| u.email);
    Ok(OrderView {
        id: order.id,
        payment_id: order.payment_id,
        status: order.status,
        items: order.items,
        total_price: order.total_price,
        role,
        counterparty_email,
        created_at: order.created_at,
        updated_at: order.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::PaymentMethod;
    use crate::test_support::Fixture;

    async fn paid_checkout(fx: &Fixture) -> String {
        let a = fx.product(&fx.seller_a, "A", 10, 5).await;
        let b = fx.product(&fx.seller_b, "B", 5, 5).await;
        let cart = fx.cart();
        cart.add_to_cart(&fx.buyer.id, &a.id, 2).await.unwrap();
        cart.add_to_cart(&fx.buyer.id, &b.id, 1).await.unwrap();
        let payments = fx.orchestrator();
        let session = payments.create_payment(&fx.buyer.id, PaymentMethod::PaymentIntent).await.unwrap();
        fx.gateway.complete(&session.payment_id);
        payments.reconcile(&session.payment_id).await.unwrap();
        session.payment_id
    }

    #[tokio::test]
    async fn test_pending_orders_are_hidden() {
        let fx = Fixture::new().await;
        let a = fx.product(&fx.seller_a, "A", 10, 5).await;
        fx.cart().add_to_cart(&fx.buyer.id, &a.id, 1).await.unwrap();
        fx.orchestrator().create_payment(&fx.buyer.id, PaymentMethod::PaymentIntent).await.unwrap();

        assert!(matches!(fx.orders().list_orders(&fx.buyer.id).await, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_buyer_sees_sellers() {
        let fx = Fixture::new().await;
        paid_checkout(&fx).await;

        let views = fx.orders().list_orders(&fx.buyer.id).await.unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.role == Role::Buyer));
        let mut emails: Vec<_> = views.iter().filter_map(|v| v.counterparty_email.clone()).collect();
        emails.sort();
        assert_eq!(emails, vec!["s1@example.com", "s2@example.com"]);
    }

    #[tokio::test]
    async fn test_seller_sees_only_own_orders() {
        let fx = Fixture::new().await;
        paid_checkout(&fx).await;

        let views = fx.orders().list_orders(&fx.seller_b.id).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].role, Role::Seller);
        assert_eq!(views[0].counterparty_email.as_deref(), Some("buyer@example.com"));
        assert_eq!(views[0].total_price, Decimal::new(5, 0));

        let mine = fx.orders().get_order(&fx.seller_b.id, &views[0].id).await.unwrap();
        assert_eq!(mine.id, views[0].id);
        let other = fx.orders().get_order(&fx.seller_a.id, &views[0].id).await;
        assert!(matches!(other, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_viewer_is_unauthorized() {
        let fx = Fixture::new().await;
        assert!(matches!(fx.orders().list_orders("ghost").await, Err(MarketError::Unauthorized(_))));
    }
}
