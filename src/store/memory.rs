//! In-process store.
//!
//! A transaction holds the store lock for its whole lifetime and works on a private copy of
//! the collections, so transactions are serializable and an uncommitted one leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{OrderParty, ProductQuery, Store, StoreError, StoreResult, Transaction};
use crate::domain::aggregates::{AuditEntry, CartLine, Order, Payment, PaymentStatus, Product, User};

#[derive(Clone, Debug, Default)]
struct Collections {
    users: HashMap<String, User>,
    products: BTreeMap<String, Product>,
    cart_lines: BTreeMap<(String, String), CartLine>,
    orders: BTreeMap<String, Order>,
    payments: BTreeMap<String, Payment>,
    audit_log: Vec<AuditEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        let guard = self.inner.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::info!("In-memory store closed");
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Collections>,
    working: Collections,
}

fn matches_search(product: &Product, seller_email: Option<&str>, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    product.name.to_lowercase().contains(&needle)
        || product.description.to_lowercase().contains(&needle)
        || seller_email.is_some_and(|email| email.to_lowercase().contains(&needle))
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn find_user(&mut self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(id).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.working.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        self.working.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn find_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(id).cloned())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<()> {
        if let Some(existing) = self.working.products.get_mut(&product.id) {
            *existing = product.clone();
        }
        Ok(())
    }

    async fn list_products(&mut self, query: &ProductQuery) -> StoreResult<Vec<Product>> {
        let users = &self.working.users;
        let mut products: Vec<Product> = self
            .working
            .products
            .values()
            .filter(|p| p.is_deleted == query.deleted)
            .filter(|p| query.seller_id.as_deref().map_or(true, |s| p.seller_id == s))
            .filter(|p| match query.search.as_deref() {
                Some(needle) => matches_search(p, users.get(&p.seller_id).map(|u| u.email.as_str()), needle),
                None => true,
            })
            .cloned()
            .collect();

        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        if query.sort_by_price {
            products.sort_by(|a, b| a.price.cmp(&b.price));
        }

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(products.into_iter().skip(query.offset as usize).take(limit).collect())
    }

    async fn try_decrement_stock(&mut self, id: &str, qty: u32) -> StoreResult<bool> {
        match self.working.products.get_mut(id) {
            Some(p) if !p.is_deleted && p.quantity >= qty => {
                p.quantity -= qty;
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_stock(&mut self, id: &str, qty: u32) -> StoreResult<bool> {
        match self.working.products.get_mut(id) {
            Some(p) if !p.is_deleted => {
                p.quantity = p.quantity.saturating_add(qty);
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_deleted_products(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.working.products.len();
        self.working.products.retain(|_, p| !p.is_purgeable(cutoff));
        Ok((before - self.working.products.len()) as u64)
    }

    async fn find_cart_line(&mut self, user_id: &str, product_id: &str) -> StoreResult<Option<CartLine>> {
        Ok(self.working.cart_lines.get(&(user_id.to_string(), product_id.to_string())).cloned())
    }

    async fn cart_lines(&mut self, user_id: &str) -> StoreResult<Vec<CartLine>> {
        let mut lines: Vec<CartLine> =
            self.working.cart_lines.values().filter(|l| l.user_id == user_id).cloned().collect();
        lines.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(lines)
    }

    async fn cart_lines_for_product(&mut self, product_id: &str) -> StoreResult<Vec<CartLine>> {
        Ok(self.working.cart_lines.values().filter(|l| l.product_id == product_id).cloned().collect())
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> StoreResult<()> {
        self.working.cart_lines.insert((line.user_id.clone(), line.product_id.clone()), line.clone());
        Ok(())
    }

    async fn update_cart_line(&mut self, line: &CartLine) -> StoreResult<()> {
        let key = (line.user_id.clone(), line.product_id.clone());
        if let Some(existing) = self.working.cart_lines.get_mut(&key) {
            *existing = line.clone();
        }
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: &str, product_id: &str) -> StoreResult<bool> {
        Ok(self.working.cart_lines.remove(&(user_id.to_string(), product_id.to_string())).is_some())
    }

    async fn clear_cart(&mut self, user_id: &str) -> StoreResult<u64> {
        let before = self.working.cart_lines.len();
        self.working.cart_lines.retain(|(user, _), _| user != user_id);
        Ok((before - self.working.cart_lines.len()) as u64)
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        self.working.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_order(&mut self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(id).cloned())
    }

    async fn orders_for_payment(&mut self, payment_id: &str) -> StoreResult<Vec<Order>> {
        Ok(self.working.orders.values().filter(|o| o.payment_id == payment_id).cloned().collect())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        if let Some(existing) = self.working.orders.get_mut(&order.id) {
            *existing = order.clone();
        }
        Ok(())
    }

    async fn list_orders(&mut self, party: &OrderParty) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| match party {
                OrderParty::Buyer(id) => &o.user_id == id,
                OrderParty::Seller(id) => &o.seller_id == id,
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.working.payments.insert(payment.payment_id.clone(), payment.clone());
        Ok(())
    }

    async fn find_payment(&mut self, payment_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self.working.payments.get(payment_id).cloned())
    }

    async fn confirm_pending_payment(&mut self, payment_id: &str) -> StoreResult<bool> {
        match self.working.payments.get_mut(payment_id) {
            Some(p) if p.status == PaymentStatus::Pending => Ok(p.confirm().is_ok()),
            _ => Ok(false),
        }
    }

    async fn insert_audit(&mut self, entry: &AuditEntry) -> StoreResult<()> {
        self.working.audit_log.push(entry.clone());
        Ok(())
    }

    async fn audit_entries(&mut self, product_id: &str) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.working.audit_log.iter().filter(|e| e.product_id == product_id).cloned().collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
