//! Shared fixtures for unit tests: an in-memory store seeded with one buyer and two sellers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::aggregates::{Product, User};
use crate::domain::events::NotificationEvent;
use crate::gateway::MockGateway;
use crate::notify::{NotificationSender, NotifyError};
use crate::services::cart::{AddPolicy, CartManager};
use crate::services::catalog::Catalog;
use crate::services::inventory::InventoryLedger;
use crate::services::orders::OrderQueries;
use crate::services::payments::{CheckoutUrls, PaymentOrchestrator};
use crate::store::{MemoryStore, Store, Transaction};

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> { self.events.lock().clone() }

    pub fn set_failing(&self, failing: bool) { *self.failing.lock() = failing; }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        if *self.failing.lock() {
            return Err(NotifyError::Publish("bus unavailable".to_string()));
        }
        self.events.lock().push(event);
        Ok(())
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub gateway: MockGateway,
    pub notifier: Arc<RecordingNotifier>,
    pub buyer: User,
    pub seller_a: User,
    pub seller_b: User,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let buyer = User::new("U1", "buyer@example.com", false);
        let seller_a = User::new("S1", "s1@example.com", true);
        let seller_b = User::new("S2", "s2@example.com", true);

        let mut tx = store.begin().await.unwrap();
        for user in [&buyer, &seller_a, &seller_b] {
            tx.insert_user(user).await.unwrap();
        }
        tx.commit().await.unwrap();

        Self { store, gateway: MockGateway::new(), notifier: Arc::new(RecordingNotifier::default()), buyer, seller_a, seller_b }
    }

    pub fn shared_store(&self) -> Arc<dyn Store> { Arc::new(self.store.clone()) }

    pub async fn tx(&self) -> Box<dyn Transaction> { self.store.begin().await.unwrap() }

    /// Inserts a live product priced in whole dollars.
    pub async fn product(&self, seller: &User, name: &str, dollars: i64, quantity: u32) -> Product {
        let product = Product::create(&seller.id, name, format!("{name} description"), Decimal::new(dollars, 0), quantity);
        let mut tx = self.tx().await;
        tx.insert_product(&product).await.unwrap();
        tx.commit().await.unwrap();
        product
    }

    pub async fn product_quantity(&self, product_id: &str) -> u32 {
        self.tx().await.find_product(product_id).await.unwrap().map(|p| p.quantity).unwrap_or_default()
    }

    pub async fn cart_quantity(&self, user_id: &str, product_id: &str) -> Option<u32> {
        self.tx().await.find_cart_line(user_id, product_id).await.unwrap().map(|l| l.quantity)
    }

    /// On-hand stock plus what the user holds in their cart.
    pub async fn held_and_on_hand(&self, user_id: &str, product_id: &str) -> u32 {
        self.product_quantity(product_id).await + self.cart_quantity(user_id, product_id).await.unwrap_or(0)
    }

    pub fn ledger(&self) -> InventoryLedger { InventoryLedger::new(self.shared_store()) }

    pub fn cart(&self) -> CartManager { self.cart_with(AddPolicy::KeepExisting) }

    pub fn cart_with(&self, policy: AddPolicy) -> CartManager { CartManager::new(self.shared_store(), policy) }

    pub fn catalog(&self) -> Catalog { Catalog::new(self.shared_store(), chrono::Duration::days(30)) }

    pub fn orders(&self) -> OrderQueries { OrderQueries::new(self.shared_store()) }

    pub fn orchestrator(&self) -> PaymentOrchestrator {
        let urls = CheckoutUrls::new("http://shop.test", "http://shop.test/orders/confirm-payment", "usd").unwrap();
        PaymentOrchestrator::new(self.shared_store(), Arc::new(self.gateway.clone()), self.notifier.clone(), urls)
    }
}
