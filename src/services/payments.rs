//! Payment Orchestrator
//!
//! Checkout turns a cart into one pending order per seller plus a single pending payment.
//! Reconciliation flips the payment, its orders and the buyer's cart in one transaction; the
//! conditional pending-to-confirmed flip on the payment is what makes it run at most once.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::splitter::{CheckoutLine, SellerSplit};
use crate::domain::aggregates::{Order, OrderError, OrderStatus, Payment, PaymentMethod};
use crate::domain::events::ItemSummary;
use crate::domain::value_objects::Money;
use crate::gateway::{GatewayStatus, LinkLineItem, PaymentGateway};
use crate::notify::NotificationSender;
use crate::store::{Store, Transaction};
use crate::{MarketError, Result};

/// Where buyers are sent to pay and where they land afterwards.
#[derive(Clone, Debug)]
pub struct CheckoutUrls {
    payment_form: Url,
    success: Url,
    currency: String,
}

impl CheckoutUrls {
    pub fn new(api_url: &str, success_url: &str, currency: &str) -> Result<Self> {
        let form = format!("{}/orders/payment_form", api_url.trim_end_matches('/'));
        let payment_form = Url::parse(&form).map_err(|e| MarketError::Validation(format!("invalid api url: {e}")))?;
        let success = Url::parse(success_url).map_err(|e| MarketError::Validation(format!("invalid success url: {e}")))?;
        Ok(Self { payment_form, success, currency: currency.to_lowercase() })
    }

    pub fn currency(&self) -> &str { &self.currency }

    pub fn success_for(&self, payment_id: &str) -> String {
        let mut url = self.success.clone();
        url.query_pairs_mut().append_pair("payment_id", payment_id);
        url.to_string()
    }

    pub fn payment_form_for(&self, client_secret: &str, payment_id: &str) -> String {
        let mut url = self.payment_form.clone();
        url.query_pairs_mut()
            .append_pair("client_secret", client_secret)
            .append_pair("success_url", &self.success_for(payment_id));
        url.to_string()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutSession {
    pub payment_id: String,
    pub payment_url: String,
    pub method: PaymentMethod,
    pub total_amount: Decimal,
    pub order_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SellerBreakdown {
    pub order_id: String,
    pub seller_id: String,
    pub seller_email: String,
    pub items: Vec<ItemSummary>,
    pub total: Decimal,
}

/// What a successful reconciliation confirmed.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcileReport {
    pub payment_id: String,
    pub buyer_email: String,
    pub orders: Vec<SellerBreakdown>,
    pub total_price: Decimal,
    pub confirmed_at: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn items(&self) -> Vec<ItemSummary> {
        self.orders.iter().flat_map(|o| o.items.iter().cloned()).collect()
    }
}

#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSender>,
    urls: CheckoutUrls,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSender>,
        urls: CheckoutUrls,
    ) -> Self {
        Self { store, gateway, notifier, urls }
    }

    /// Creates pending orders and a pending payment for the user's cart.
    ///
    /// Stock stays reserved and the cart stays intact until the payment is reconciled.
    #[instrument(skip(self))]
    pub async fn create_payment(&self, user_id: &str, method: PaymentMethod) -> Result<CheckoutSession> {
        let split = self.checkout_split(user_id).await?;
        let total = split.total_amount();

        let (payment_id, payment_url) = match method {
            PaymentMethod::PaymentIntent => {
                let intent = self.gateway.create_intent(&Money::new(total, self.urls.currency())).await?;
                let url = self.urls.payment_form_for(&intent.client_secret, &intent.id);
                (intent.id, url)
            }
            PaymentMethod::PaymentLink => {
                let mut line_items = Vec::new();
                for item in split.items() {
                    let price_id = self
                        .gateway
                        .create_price_line(&Money::new(item.unit_price, self.urls.currency()), &item.name)
                        .await?;
                    line_items.push(LinkLineItem { price_id, quantity: item.quantity });
                }
                let link = self.gateway.create_payment_link(&line_items).await?;
                self.gateway.set_redirect(&link.id, &self.urls.success_for(&link.id)).await?;
                (link.id, link.url)
            }
        };

        let orders = split.to_orders(user_id, &payment_id);
        let mut tx = self.store.begin().await?;
        for order in &orders {
            tx.insert_order(order).await?;
        }
        tx.insert_payment(&Payment::pending(user_id, &payment_id, method, total)).await?;
        tx.commit().await?;

        info!(user_id, %payment_id, %method, %total, orders = orders.len(), "Checkout created");
        Ok(CheckoutSession {
            payment_id,
            payment_url,
            method,
            total_amount: total,
            order_ids: orders.into_iter().map(|o| o.id).collect(),
        })
    }

    async fn checkout_split(&self, user_id: &str) -> Result<SellerSplit> {
        let mut tx = self.store.begin().await?;
        let mut lines = Vec::new();
        for line in tx.cart_lines(user_id).await? {
            let product = tx
                .find_product(&line.product_id)
                .await?
                .filter(|p| p.is_active())
                .ok_or_else(|| MarketError::not_found(format!("product {}", line.product_id)))?;
            lines.push(CheckoutLine::new(product, line.quantity));
        }
        if lines.is_empty() {
            return Err(MarketError::not_found("cart"));
        }
        Ok(SellerSplit::split(&lines))
    }

    /// Confirms a paid checkout: payment and orders move to confirmed and the buyer's cart is
    /// cleared, all or nothing. Sellers and buyer are notified after commit.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, payment_id: &str) -> Result<ReconcileReport> {
        let payment = {
            let mut tx = self.store.begin().await?;
            tx.find_payment(payment_id).await?.ok_or_else(|| MarketError::not_found(format!("payment {payment_id}")))?
        };
        if !payment.is_pending() {
            return Err(MarketError::AlreadyProcessed(payment_id.to_string()));
        }

        let status = self.gateway.get_status(payment.payment_method, payment_id).await?;
        if status != GatewayStatus::Succeeded {
            info!(payment_id, ?status, "Payment not completed yet");
            return Err(MarketError::PaymentIncomplete(payment_id.to_string()));
        }

        let mut tx = self.store.begin().await?;
        if !tx.confirm_pending_payment(payment_id).await? {
            return Err(MarketError::AlreadyProcessed(payment_id.to_string()));
        }
        let buyer = tx
            .find_user(&payment.user_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("user {}", payment.user_id)))?;

        let orders = tx.orders_for_payment(payment_id).await?;
        ensure_cart_matches(tx.as_mut(), &buyer.id, payment_id, &orders).await?;

        let mut breakdown = Vec::new();
        for mut order in orders {
            if order.status == OrderStatus::Pending {
                confirm(&mut order)?;
                tx.update_order(&order).await?;
            }
            let seller = tx
                .find_user(&order.seller_id)
                .await?
                .ok_or_else(|| MarketError::not_found(format!("seller {}", order.seller_id)))?;
            breakdown.push(SellerBreakdown {
                order_id: order.id,
                seller_id: order.seller_id,
                seller_email: seller.email,
                items: order.items.iter().map(ItemSummary::from).collect(),
                total: order.total_price,
            });
        }
        let cleared = tx.clear_cart(&buyer.id).await?;
        tx.commit().await?;

        let report = ReconcileReport {
            payment_id: payment_id.to_string(),
            buyer_email: buyer.email,
            total_price: breakdown.iter().map(|o| o.total).sum(),
            orders: breakdown,
            confirmed_at: Utc::now(),
        };
        info!(payment_id, orders = report.orders.len(), cleared, total = %report.total_price, "Payment reconciled");

        self.send_confirmations(&report).await;
        Ok(report)
    }

    async fn send_confirmations(&self, report: &ReconcileReport) {
        for order in &report.orders {
            if let Err(e) = self
                .notifier
                .notify_seller_new_order(&order.seller_email, &report.buyer_email, &order.items, order.total)
                .await
            {
                warn!(error = %e, order_id = %order.order_id, "Failed to notify seller");
            }
        }
        if let Err(e) = self
            .notifier
            .notify_buyer_order_confirmed(&report.buyer_email, &report.items(), report.total_price)
            .await
        {
            warn!(error = %e, payment_id = %report.payment_id, "Failed to notify buyer");
        }
    }

    /// Moves a confirmed order to delivered. Only the order's seller may do this.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, seller_id: &str, order_id: &str) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let seller = tx
            .find_user(seller_id)
            .await?
            .filter(|u| u.is_seller)
            .ok_or_else(|| MarketError::Unauthorized("only sellers can deliver orders".to_string()))?;
        let mut order = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("order {order_id}")))?;
        if order.seller_id != seller.id {
            return Err(MarketError::Unauthorized(format!("order {order_id} belongs to another seller")));
        }

        order.deliver().map_err(|e| transition_error(&order.id, e))?;
        let buyer = tx
            .find_user(&order.user_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("user {}", order.user_id)))?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        info!(order_id, seller_id, "Order delivered");
        if let Err(e) = self.notifier.notify_buyer_delivered(&buyer.email, &seller.email).await {
            warn!(error = %e, order_id, "Failed to notify buyer of delivery");
        }
        Ok(order)
    }
}

/// The buyer's held cart lines must be exactly what the orders sell.
async fn ensure_cart_matches(
    tx: &mut dyn Transaction,
    user_id: &str,
    payment_id: &str,
    orders: &[Order],
) -> Result<()> {
    let mut ordered: BTreeMap<&str, u32> = BTreeMap::new();
    for item in orders.iter().flat_map(|o| o.items.iter()) {
        *ordered.entry(item.product_id.as_str()).or_default() += item.quantity;
    }
    let held: BTreeMap<String, u32> =
        tx.cart_lines(user_id).await?.into_iter().map(|line| (line.product_id, line.quantity)).collect();

    let matches = held.len() == ordered.len()
        && ordered.iter().all(|(product_id, qty)| held.get(*product_id) == Some(qty));
    if !matches {
        warn!(payment_id, user_id, "Cart changed after checkout, leaving payment pending");
        return Err(MarketError::Validation(format!(
            "cart changed since checkout of payment {payment_id}; restore it or check out again"
        )));
    }
    Ok(())
}

fn confirm(order: &mut Order) -> Result<()> {
    order.confirm().map_err(|e| transition_error(&order.id, e))
}

fn transition_error(order_id: &str, err: OrderError) -> MarketError {
    let OrderError::InvalidTransition { from, to } = err;
    MarketError::InvalidTransition { order_id: order_id.to_string(), from: from.to_string(), to: to.to_string() }
}
