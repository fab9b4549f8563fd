//! Application services: the marketplace core on top of the store, gateway and notifier.

pub mod cart;
pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod splitter;

use std::sync::Arc;

use crate::gateway::PaymentGateway;
use crate::notify::NotificationSender;
use crate::store::Store;

pub use cart::{AddOutcome, AddPolicy, CartManager};
pub use catalog::Catalog;
pub use inventory::InventoryLedger;
pub use orders::{OrderQueries, OrderView};
pub use payments::{CheckoutSession, CheckoutUrls, PaymentOrchestrator, ReconcileReport};
pub use splitter::{CheckoutLine, SellerSplit};

/// Every service wired to the same store.
#[derive(Clone)]
pub struct Services {
    pub catalog: Catalog,
    pub cart: CartManager,
    pub payments: PaymentOrchestrator,
    pub orders: OrderQueries,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSender>,
        urls: CheckoutUrls,
        add_policy: AddPolicy,
        restore_window: chrono::Duration,
    ) -> Self {
        Self {
            catalog: Catalog::new(store.clone(), restore_window),
            cart: CartManager::new(store.clone(), add_policy),
            payments: PaymentOrchestrator::new(store.clone(), gateway, notifier, urls),
            orders: OrderQueries::new(store),
        }
    }
}
