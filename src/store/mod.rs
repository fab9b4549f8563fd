//! Transactional document store.
//!
//! Every mutation in the core runs inside a [`Transaction`]. Dropping a transaction without
//! calling [`Transaction::commit`] discards all of its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::aggregates::{AuditEntry, CartLine, Order, Payment, Product, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt {collection} record: {reason}")]
    Corrupt { collection: &'static str, reason: String },

    #[error("store is closed")]
    Closed,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Catalog listing filter.
#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    /// Case-insensitive match on name, description or seller email.
    pub search: Option<String>,
    pub seller_id: Option<String>,
    /// List soft-deleted products instead of live ones.
    pub deleted: bool,
    pub sort_by_price: bool,
    pub offset: u32,
    pub limit: Option<u32>,
}

/// Whose orders to list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderParty {
    Buyer(String),
    Seller(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;

    /// Releases the underlying connections. Later `begin` calls fail with [`StoreError::Closed`].
    async fn close(&self);
}

#[async_trait]
pub trait Transaction: Send {
    // users
    async fn find_user(&mut self, id: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;

    // products
    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;
    /// Finds a product whether or not it is soft-deleted. The row stays locked until the
    /// transaction ends, so a later `update_product` cannot overwrite a concurrent stock move.
    async fn find_product(&mut self, id: &str) -> StoreResult<Option<Product>>;
    async fn update_product(&mut self, product: &Product) -> StoreResult<()>;
    async fn list_products(&mut self, query: &ProductQuery) -> StoreResult<Vec<Product>>;
    /// Conditional decrement: applies only when the product is live and holds at least `qty`.
    async fn try_decrement_stock(&mut self, id: &str, qty: u32) -> StoreResult<bool>;
    /// Increment of a live product's stock.
    async fn increment_stock(&mut self, id: &str, qty: u32) -> StoreResult<bool>;
    /// Hard-deletes soft-deleted products whose `deleted_at` is at or before `cutoff`.
    async fn purge_deleted_products(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    // cart lines
    async fn find_cart_line(&mut self, user_id: &str, product_id: &str) -> StoreResult<Option<CartLine>>;
    async fn cart_lines(&mut self, user_id: &str) -> StoreResult<Vec<CartLine>>;
    async fn cart_lines_for_product(&mut self, product_id: &str) -> StoreResult<Vec<CartLine>>;
    async fn insert_cart_line(&mut self, line: &CartLine) -> StoreResult<()>;
    async fn update_cart_line(&mut self, line: &CartLine) -> StoreResult<()>;
    async fn delete_cart_line(&mut self, user_id: &str, product_id: &str) -> StoreResult<bool>;
    async fn clear_cart(&mut self, user_id: &str) -> StoreResult<u64>;

    // orders
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn find_order(&mut self, id: &str) -> StoreResult<Option<Order>>;
    async fn orders_for_payment(&mut self, payment_id: &str) -> StoreResult<Vec<Order>>;
    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn list_orders(&mut self, party: &OrderParty) -> StoreResult<Vec<Order>>;

    // payments
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;
    async fn find_payment(&mut self, payment_id: &str) -> StoreResult<Option<Payment>>;
    /// Flips a pending payment to confirmed. Returns false when it was not pending.
    async fn confirm_pending_payment(&mut self, payment_id: &str) -> StoreResult<bool>;

    // product audit trail
    async fn insert_audit(&mut self, entry: &AuditEntry) -> StoreResult<()>;
    /// Oldest first. Entries outlive the product they refer to.
    async fn audit_entries(&mut self, product_id: &str) -> StoreResult<Vec<AuditEntry>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
