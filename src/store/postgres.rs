//! PostgreSQL store backed by sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Postgres;

use super::{OrderParty, ProductQuery, Store, StoreError, StoreResult, Transaction};
use crate::domain::aggregates::{AuditEntry, CartLine, Order, OrderItem, Payment, Product, User};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

// =============================================================================
// Row mappings
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow { id: String, email: String, is_seller: bool }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String, seller_id: String, name: String, description: String, price: Decimal, quantity: i32,
    images: Vec<String>, is_deleted: bool, deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartLineRow { user_id: String, product_id: String, quantity: i32, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String, seller_id: String, user_id: String, payment_id: String, items: Json<Vec<OrderItem>>,
    total_price: Decimal, status: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String, user_id: String, payment_id: String, payment_method: String, amount: Decimal, status: String,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AuditRow { id: String, action: String, actor_id: String, product_id: String, message: String, at: DateTime<Utc> }

fn corrupt(collection: &'static str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt { collection, reason: reason.to_string() }
}

fn to_quantity(collection: &'static str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| corrupt(collection, format!("negative quantity {value}")))
}

fn to_db_quantity(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| corrupt("products", format!("quantity {value} out of range")))
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self { User { id: r.id, email: r.email, is_seller: r.is_seller } }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        Ok(Product {
            quantity: to_quantity("products", r.quantity)?,
            id: r.id, seller_id: r.seller_id, name: r.name, description: r.description, price: r.price,
            images: r.images, is_deleted: r.is_deleted, deleted_at: r.deleted_at,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = StoreError;
    fn try_from(r: CartLineRow) -> StoreResult<Self> {
        Ok(CartLine {
            quantity: to_quantity("cart_lines", r.quantity)?,
            user_id: r.user_id, product_id: r.product_id, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> StoreResult<Self> {
        Ok(Order {
            status: r.status.parse().map_err(|e| corrupt("orders", e))?,
            id: r.id, seller_id: r.seller_id, user_id: r.user_id, payment_id: r.payment_id, items: r.items.0,
            total_price: r.total_price, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;
    fn try_from(r: PaymentRow) -> StoreResult<Self> {
        Ok(Payment {
            payment_method: r.payment_method.parse().map_err(|e| corrupt("payments", e))?,
            status: r.status.parse().map_err(|e| corrupt("payments", e))?,
            id: r.id, user_id: r.user_id, payment_id: r.payment_id, amount: r.amount,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;
    fn try_from(r: AuditRow) -> StoreResult<Self> {
        Ok(AuditEntry {
            action: r.action.parse().map_err(|e| corrupt("audit_log", e))?,
            id: r.id, actor_id: r.actor_id, product_id: r.product_id, message: r.message, at: r.at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// =============================================================================
// Transaction
// =============================================================================

#[async_trait]
impl Transaction for PgTransaction {
    async fn find_user(&mut self, id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, email, is_seller FROM users WHERE id = $1")
            .bind(id).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, email, is_seller) VALUES ($1, $2, $3)")
            .bind(&user.id).bind(&user.email).bind(user.is_seller)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_product(&mut self, p: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, seller_id, name, description, price, quantity, images, is_deleted, deleted_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
            .bind(&p.id).bind(&p.seller_id).bind(&p.name).bind(&p.description).bind(p.price)
            .bind(to_db_quantity(p.quantity)?).bind(&p.images).bind(p.is_deleted).bind(p.deleted_at)
            .bind(p.created_at).bind(p.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn find_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(Product::try_from).transpose()
    }

    async fn update_product(&mut self, p: &Product) -> StoreResult<()> {
        sqlx::query("UPDATE products SET name = $2, description = $3, price = $4, quantity = $5, images = $6, is_deleted = $7, deleted_at = $8, updated_at = $9 WHERE id = $1")
            .bind(&p.id).bind(&p.name).bind(&p.description).bind(p.price).bind(to_db_quantity(p.quantity)?)
            .bind(&p.images).bind(p.is_deleted).bind(p.deleted_at).bind(p.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn list_products(&mut self, q: &ProductQuery) -> StoreResult<Vec<Product>> {
        let pattern = q.search.as_ref().map(|s| format!("%{s}%"));
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT p.* FROM products p LEFT JOIN users u ON u.id = p.seller_id \
             WHERE p.is_deleted = $1 \
               AND ($2::text IS NULL OR p.seller_id = $2) \
               AND ($3::text IS NULL OR p.name ILIKE $3 OR p.description ILIKE $3 OR u.email ILIKE $3) \
             ORDER BY CASE WHEN $4 THEN p.price END ASC, p.created_at DESC, p.id DESC \
             LIMIT $5 OFFSET $6",
        )
        .bind(q.deleted).bind(&q.seller_id).bind(pattern).bind(q.sort_by_price)
        .bind(q.limit.map(i64::from)).bind(i64::from(q.offset))
        .fetch_all(&mut *self.tx).await?;
        collect(rows)
    }

    async fn try_decrement_stock(&mut self, id: &str, qty: u32) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE products SET quantity = quantity - $2, updated_at = NOW() WHERE id = $1 AND is_deleted = FALSE AND quantity >= $2")
            .bind(id).bind(to_db_quantity(qty)?)
            .execute(&mut *self.tx).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_stock(&mut self, id: &str, qty: u32) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE products SET quantity = quantity + $2, updated_at = NOW() WHERE id = $1 AND is_deleted = FALSE")
            .bind(id).bind(to_db_quantity(qty)?)
            .execute(&mut *self.tx).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_deleted_products(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM products WHERE is_deleted = TRUE AND deleted_at <= $1")
            .bind(cutoff).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn find_cart_line(&mut self, user_id: &str, product_id: &str) -> StoreResult<Option<CartLine>> {
        let row = sqlx::query_as::<_, CartLineRow>("SELECT * FROM cart_lines WHERE user_id = $1 AND product_id = $2 FOR UPDATE")
            .bind(user_id).bind(product_id).fetch_optional(&mut *self.tx).await?;
        row.map(CartLine::try_from).transpose()
    }

    async fn cart_lines(&mut self, user_id: &str) -> StoreResult<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLineRow>("SELECT * FROM cart_lines WHERE user_id = $1 ORDER BY created_at FOR UPDATE")
            .bind(user_id).fetch_all(&mut *self.tx).await?;
        collect(rows)
    }

    async fn cart_lines_for_product(&mut self, product_id: &str) -> StoreResult<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLineRow>("SELECT * FROM cart_lines WHERE product_id = $1")
            .bind(product_id).fetch_all(&mut *self.tx).await?;
        collect(rows)
    }

    async fn insert_cart_line(&mut self, l: &CartLine) -> StoreResult<()> {
        sqlx::query("INSERT INTO cart_lines (user_id, product_id, quantity, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(&l.user_id).bind(&l.product_id).bind(to_db_quantity(l.quantity)?).bind(l.created_at).bind(l.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn update_cart_line(&mut self, l: &CartLine) -> StoreResult<()> {
        sqlx::query("UPDATE cart_lines SET quantity = $3, updated_at = $4 WHERE user_id = $1 AND product_id = $2")
            .bind(&l.user_id).bind(&l.product_id).bind(to_db_quantity(l.quantity)?).bind(l.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: &str, product_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_cart(&mut self, user_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = $1").bind(user_id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, o: &Order) -> StoreResult<()> {
        sqlx::query("INSERT INTO orders (id, seller_id, user_id, payment_id, items, total_price, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(&o.id).bind(&o.seller_id).bind(&o.user_id).bind(&o.payment_id).bind(Json(&o.items))
            .bind(o.total_price).bind(o.status.as_str()).bind(o.created_at).bind(o.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn find_order(&mut self, id: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(Order::try_from).transpose()
    }

    async fn orders_for_payment(&mut self, payment_id: &str) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE payment_id = $1 ORDER BY seller_id FOR UPDATE")
            .bind(payment_id).fetch_all(&mut *self.tx).await?;
        collect(rows)
    }

    async fn update_order(&mut self, o: &Order) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(&o.id).bind(o.status.as_str()).bind(o.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn list_orders(&mut self, party: &OrderParty) -> StoreResult<Vec<Order>> {
        let (sql, id) = match party {
            OrderParty::Buyer(id) => ("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC", id),
            OrderParty::Seller(id) => ("SELECT * FROM orders WHERE seller_id = $1 ORDER BY created_at DESC", id),
        };
        let rows = sqlx::query_as::<_, OrderRow>(sql).bind(id).fetch_all(&mut *self.tx).await?;
        collect(rows)
    }

    async fn insert_payment(&mut self, p: &Payment) -> StoreResult<()> {
        sqlx::query("INSERT INTO payments (id, user_id, payment_id, payment_method, amount, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(&p.id).bind(&p.user_id).bind(&p.payment_id).bind(p.payment_method.as_str()).bind(p.amount)
            .bind(p.status.as_str()).bind(p.created_at).bind(p.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn find_payment(&mut self, payment_id: &str) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE payment_id = $1")
            .bind(payment_id).fetch_optional(&mut *self.tx).await?;
        row.map(Payment::try_from).transpose()
    }

    async fn confirm_pending_payment(&mut self, payment_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE payments SET status = 'confirmed', updated_at = NOW() WHERE payment_id = $1 AND status = 'pending'")
            .bind(payment_id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_audit(&mut self, e: &AuditEntry) -> StoreResult<()> {
        sqlx::query("INSERT INTO audit_log (id, action, actor_id, product_id, message, at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(&e.id).bind(e.action.as_str()).bind(&e.actor_id).bind(&e.product_id).bind(&e.message).bind(e.at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn audit_entries(&mut self, product_id: &str) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>("SELECT * FROM audit_log WHERE product_id = $1 ORDER BY at, id")
            .bind(product_id).fetch_all(&mut *self.tx).await?;
        collect(rows)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{AuditAction, OrderStatus, PaymentMethod};
    use uuid::Uuid;

    /// Connects and migrates, or `None` when no database is configured.
    async fn store() -> Option<PgStore> {
        let url = std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")).ok()?;
        let store = PgStore::connect(&url, 5).await.expect("Failed to connect to PostgreSQL");
        store.migrate().await.expect("Failed to run migrations");
        Some(store)
    }

    async fn seed_user(store: &PgStore, is_seller: bool) -> User {
        let id = Uuid::now_v7().simple().to_string();
        let user = User::new(id.clone(), format!("{id}@example.com"), is_seller);
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();
        user
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL via DATABASE_URL"]
    async fn test_stock_decrement_is_conditional() {
        let Some(store) = store().await else { return };
        let seller = seed_user(&store, true).await;
        let mut product = Product::create(&seller.id, "Widget", "pg", Decimal::new(1050, 2), 2);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&product).await.unwrap();
        assert!(!tx.try_decrement_stock(&product.id, 3).await.unwrap());
        assert!(tx.try_decrement_stock(&product.id, 2).await.unwrap());
        assert!(!tx.try_decrement_stock(&product.id, 1).await.unwrap());
        assert!(tx.increment_stock(&product.id, 1).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        product = tx.find_product(&product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 1);
        assert_eq!(product.price, Decimal::new(1050, 2));
        product.soft_delete(Utc::now()).unwrap();
        tx.update_product(&product).await.unwrap();
        assert!(!tx.try_decrement_stock(&product.id, 1).await.unwrap());
        assert!(!tx.increment_stock(&product.id, 1).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL via DATABASE_URL"]
    async fn test_orders_may_be_written_before_their_payment() {
        let Some(store) = store().await else { return };
        let buyer = seed_user(&store, false).await;
        let seller = seed_user(&store, true).await;
        let payment_id = format!("pi_test_{}", Uuid::now_v7().simple());
        let item = OrderItem { product_id: "P1".into(), name: "Widget".into(), unit_price: Decimal::new(5, 0), quantity: 2 };
        let order = Order::pending(&seller.id, &buyer.id, &payment_id, vec![item]);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.insert_payment(&Payment::pending(&buyer.id, &payment_id, PaymentMethod::PaymentIntent, order.total_price))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.confirm_pending_payment(&payment_id).await.unwrap());
        assert!(!tx.confirm_pending_payment(&payment_id).await.unwrap());
        let mut stored = tx.orders_for_payment(&payment_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].items[0].quantity, 2);
        stored[0].confirm().unwrap();
        tx.update_order(&stored[0]).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find_order(&order.id).await.unwrap().unwrap().status, OrderStatus::Confirmed);
        assert!(!tx.find_payment(&payment_id).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL via DATABASE_URL"]
    async fn test_dropped_transaction_leaves_no_trace() {
        let Some(store) = store().await else { return };
        let seller = seed_user(&store, true).await;
        let product = Product::create(&seller.id, "Widget", "pg", Decimal::ONE, 1);
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_product(&product).await.unwrap();
            tx.insert_audit(&AuditEntry::new(AuditAction::CreateProduct, &seller.id, &product.id, "")).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_product(&product.id).await.unwrap().is_none());
        assert!(tx.audit_entries(&product.id).await.unwrap().is_empty());
        tx.insert_audit(&AuditEntry::new(AuditAction::CreateProduct, &seller.id, &product.id, "kept")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let trail = tx.audit_entries(&product.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::CreateProduct);
    }
}
