//! In-process payment gateway for local development and tests.
//!
//! Payments start out pending; flip them with [`MockGateway::complete`] or [`MockGateway::fail`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::{GatewayError, GatewayResult, GatewayStatus, LinkLineItem, PaymentGateway, PaymentIntent, PaymentLink};
use crate::domain::aggregates::PaymentMethod;
use crate::domain::value_objects::Money;

#[derive(Debug, Clone)]
pub struct MockPrice {
    pub id: String,
    pub name: String,
    pub unit_amount: Money,
}

#[derive(Debug, Default)]
struct MockState {
    statuses: HashMap<String, GatewayStatus>,
    charged: HashMap<String, Money>,
    prices: Vec<MockPrice>,
    links: HashMap<String, Vec<LinkLineItem>>,
    redirects: HashMap<String, String>,
    fail_next: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self { Self::default() }

    pub fn complete(&self, payment_id: &str) { self.set_status(payment_id, GatewayStatus::Succeeded); }
    pub fn fail(&self, payment_id: &str) { self.set_status(payment_id, GatewayStatus::Failed); }

    /// Makes the next gateway call fail with a provider rejection.
    pub fn reject_next(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    pub fn charged(&self, payment_id: &str) -> Option<Money> {
        self.state.lock().charged.get(payment_id).cloned()
    }

    pub fn prices(&self) -> Vec<MockPrice> { self.state.lock().prices.clone() }

    pub fn link_items(&self, link_id: &str) -> Option<Vec<LinkLineItem>> {
        self.state.lock().links.get(link_id).cloned()
    }

    pub fn redirect(&self, link_id: &str) -> Option<String> {
        self.state.lock().redirects.get(link_id).cloned()
    }

    fn set_status(&self, payment_id: &str, status: GatewayStatus) {
        self.state.lock().statuses.insert(payment_id.to_string(), status);
    }

    fn check_rejection(&self) -> GatewayResult<()> {
        match self.state.lock().fail_next.take() {
            Some(message) => Err(GatewayError::Rejected(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(&self, amount: &Money) -> GatewayResult<PaymentIntent> {
        self.check_rejection()?;
        if amount.amount() <= Decimal::ZERO {
            return Err(GatewayError::Rejected("amount must be greater than zero".to_string()));
        }
        let id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let client_secret = format!("{}_secret_{}", id, Uuid::new_v4().simple());
        let mut state = self.state.lock();
        state.statuses.insert(id.clone(), GatewayStatus::Pending);
        state.charged.insert(id.clone(), amount.clone());
        info!(intent_id = %id, amount = %amount.amount(), "Mock payment intent created");
        Ok(PaymentIntent { id, client_secret })
    }

    async fn create_price_line(&self, unit_amount: &Money, name: &str) -> GatewayResult<String> {
        self.check_rejection()?;
        let id = format!("price_mock_{}", Uuid::new_v4().simple());
        self.state.lock().prices.push(MockPrice { id: id.clone(), name: name.to_string(), unit_amount: unit_amount.clone() });
        Ok(id)
    }

    async fn create_payment_link(&self, line_items: &[LinkLineItem]) -> GatewayResult<PaymentLink> {
        self.check_rejection()?;
        let mut state = self.state.lock();
        let mut total: Option<Money> = None;
        for item in line_items {
            let price = state
                .prices
                .iter()
                .find(|p| p.id == item.price_id)
                .ok_or_else(|| GatewayError::Rejected(format!("no such price: {}", item.price_id)))?;
            let line = price.unit_amount.multiply(item.quantity);
            total = Some(match total {
                Some(acc) => acc.add(&line).map_err(GatewayError::InvalidAmount)?,
                None => line,
            });
        }
        let id = format!("plink_mock_{}", Uuid::new_v4().simple());
        let url = format!("https://pay.mock/{id}");
        state.statuses.insert(id.clone(), GatewayStatus::Pending);
        state.links.insert(id.clone(), line_items.to_vec());
        if let Some(total) = total {
            state.charged.insert(id.clone(), total);
        }
        Ok(PaymentLink { id, url })
    }

    async fn set_redirect(&self, link_id: &str, url: &str) -> GatewayResult<()> {
        self.check_rejection()?;
        let mut state = self.state.lock();
        if !state.links.contains_key(link_id) {
            return Err(GatewayError::Rejected(format!("no such payment link: {link_id}")));
        }
        state.redirects.insert(link_id.to_string(), url.to_string());
        Ok(())
    }

    async fn get_status(&self, _method: PaymentMethod, payment_id: &str) -> GatewayResult<GatewayStatus> {
        self.check_rejection()?;
        self.state
            .lock()
            .statuses
            .get(payment_id)
            .copied()
            .ok_or_else(|| GatewayError::Rejected(format!("no such payment: {payment_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_intent_lifecycle() {
        let gateway = MockGateway::new();
        let intent = gateway.create_intent(&Money::usd(Decimal::new(25, 0))).await.unwrap();
        assert_eq!(gateway.get_status(PaymentMethod::PaymentIntent, &intent.id).await.unwrap(), GatewayStatus::Pending);
        gateway.complete(&intent.id);
        assert_eq!(gateway.get_status(PaymentMethod::PaymentIntent, &intent.id).await.unwrap(), GatewayStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_link_totals_its_prices() {
        let gateway = MockGateway::new();
        let price = gateway.create_price_line(&Money::usd(Decimal::new(10, 0)), "Widget").await.unwrap();
        let link = gateway.create_payment_link(&[LinkLineItem { price_id: price, quantity: 3 }]).await.unwrap();
        assert_eq!(gateway.charged(&link.id).unwrap().amount(), Decimal::new(30, 0));
    }

    #[tokio::test]
    async fn test_reject_next_applies_once() {
        let gateway = MockGateway::new();
        gateway.reject_next("card_declined");
        assert!(gateway.create_intent(&Money::usd(Decimal::ONE)).await.is_err());
        assert!(gateway.create_intent(&Money::usd(Decimal::ONE)).await.is_ok());
    }
}
