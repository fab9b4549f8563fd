//! Product catalog owned by sellers.
//!
//! Deleting a product is soft: it disappears from listings and carts, and its seller may restore
//! it within the restore window. Past the window the sweep job removes it for good.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::inventory::InventoryLedger;
use crate::domain::aggregates::{AuditAction, AuditEntry, Product, ProductError, User};
use crate::store::{ProductQuery, Store, Transaction};
use crate::{MarketError, Result};

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub quantity: Option<u32>,
    pub images: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductListing {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort_by_price: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductView {
    pub id: String,
    pub seller_id: String,
    pub seller_email: Option<String>,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub quantity: u32,
    pub is_available: bool,
    pub images: Vec<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    restore_window: Duration,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>, restore_window: Duration) -> Self {
        Self { store, restore_window }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, seller_id: &str, input: NewProduct) -> Result<Product> {
        validate_text("name", &input.name)?;
        validate_text("description", &input.description)?;
        validate_price(input.price)?;
        if input.quantity < 1 {
            return Err(MarketError::Validation("quantity must be at least 1".to_string()));
        }

        let mut tx = self.store.begin().await?;
        require_seller(tx.as_mut(), seller_id).await?;

        let mut product = Product::create(seller_id, input.name.trim(), input.description.trim(), input.price, input.quantity);
        product.images = input.images;
        tx.insert_product(&product).await?;
        let message = format!("created with {} in stock", product.quantity);
        record(tx.as_mut(), AuditAction::CreateProduct, seller_id, &product.id, message).await?;
        tx.commit().await?;

        info!(product_id = %product.id, seller_id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_product(&self, seller_id: &str, product_id: &str, patch: ProductPatch) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let mut product = owned_product(tx.as_mut(), seller_id, product_id, false).await?;
        let mut changed = Vec::new();

        if let Some(name) = patch.name {
            validate_text("name", &name)?;
            product.name = name.trim().to_string();
            changed.push("name");
        }
        if let Some(description) = patch.description {
            validate_text("description", &description)?;
            product.description = description.trim().to_string();
            changed.push("description");
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
            product.price = price;
            changed.push("price");
        }
        if let Some(quantity) = patch.quantity {
            product.quantity = quantity;
            changed.push("quantity");
        }
        if let Some(images) = patch.images {
            product.images = images;
            changed.push("images");
        }
        product.updated_at = Utc::now();

        tx.update_product(&product).await?;
        record(tx.as_mut(), AuditAction::UpdateProduct, seller_id, product_id, changed.join(", ")).await?;
        tx.commit().await?;
        info!(product_id, "Product updated");
        Ok(product)
    }

    pub async fn get_product(&self, product_id: &str) -> Result<ProductView> {
        let mut tx = self.store.begin().await?;
        let product = tx
            .find_product(product_id)
            .await?
            .filter(Product::is_active)
            .ok_or_else(|| MarketError::not_found(format!("product {product_id}")))?;
        view(tx.as_mut(), product).await
    }

    pub async fn list_products(&self, listing: ProductListing) -> Result<Vec<ProductView>> {
        let page = listing.page.unwrap_or(1);
        let limit = listing.limit.unwrap_or(10);
        if page < 1 {
            return Err(MarketError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(MarketError::Validation(format!("limit must be between 1 and {MAX_PAGE_SIZE}")));
        }

        let query = ProductQuery {
            search: listing.search.filter(|s| !s.trim().is_empty()),
            sort_by_price: listing.sort_by_price,
            offset: (page - 1).saturating_mul(limit),
            limit: Some(limit),
            ..ProductQuery::default()
        };
        self.listing(query).await
    }

    pub async fn seller_products(&self, seller_id: &str) -> Result<Vec<ProductView>> {
        self.seller_listing(seller_id, false).await
    }

    pub async fn deleted_products(&self, seller_id: &str) -> Result<Vec<ProductView>> {
        self.seller_listing(seller_id, true).await
    }

    async fn seller_listing(&self, seller_id: &str, deleted: bool) -> Result<Vec<ProductView>> {
        {
            let mut tx = self.store.begin().await?;
            require_seller(tx.as_mut(), seller_id).await?;
        }
        self.listing(ProductQuery { seller_id: Some(seller_id.to_string()), deleted, ..ProductQuery::default() })
            .await
    }

    async fn listing(&self, query: ProductQuery) -> Result<Vec<ProductView>> {
        let mut tx = self.store.begin().await?;
        let mut views = Vec::new();
        for product in tx.list_products(&query).await? {
            views.push(view(tx.as_mut(), product).await?);
        }
        if views.is_empty() {
            return Err(MarketError::not_found("products"));
        }
        Ok(views)
    }

    /// Soft-deletes a product. Every cart line holding it is dropped and its quantity returned
    /// to stock first.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, seller_id: &str, product_id: &str) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        owned_product(tx.as_mut(), seller_id, product_id, false).await?;

        let lines = tx.cart_lines_for_product(product_id).await?;
        for line in &lines {
            InventoryLedger::release_in(tx.as_mut(), product_id, line.quantity).await?;
            tx.delete_cart_line(&line.user_id, product_id).await?;
        }

        let mut product = owned_product(tx.as_mut(), seller_id, product_id, false).await?;
        product.soft_delete(Utc::now()).map_err(product_error)?;
        tx.update_product(&product).await?;
        let message = format!("released {} cart line(s)", lines.len());
        record(tx.as_mut(), AuditAction::DeleteProduct, seller_id, product_id, message).await?;
        tx.commit().await?;

        info!(product_id, carts = lines.len(), "Product soft-deleted");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn restore_product(&self, seller_id: &str, product_id: &str) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let mut product = owned_product(tx.as_mut(), seller_id, product_id, true).await?;
        product.restore(Utc::now(), self.restore_window).map_err(product_error)?;
        tx.update_product(&product).await?;
        record(tx.as_mut(), AuditAction::RestoreProduct, seller_id, product_id, String::new()).await?;
        tx.commit().await?;

        info!(product_id, "Product restored");
        Ok(product)
    }

    /// Changes recorded against one of the seller's products, oldest first.
    pub async fn audit_trail(&self, seller_id: &str, product_id: &str) -> Result<Vec<AuditEntry>> {
        let mut tx = self.store.begin().await?;
        require_seller(tx.as_mut(), seller_id).await?;
        match tx.find_product(product_id).await? {
            Some(p) if p.seller_id == seller_id => Ok(tx.audit_entries(product_id).await?),
            Some(_) => Err(MarketError::Unauthorized(format!("product {product_id} belongs to another seller"))),
            None => Err(MarketError::not_found(format!("product {product_id}"))),
        }
    }

    /// Hard-deletes products soft-deleted longer ago than the restore window.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let purged = tx.purge_deleted_products(now - self.restore_window).await?;
        tx.commit().await?;
        Ok(purged)
    }
}

async fn record(
    tx: &mut dyn Transaction,
    action: AuditAction,
    seller_id: &str,
    product_id: &str,
    message: impl Into<String>,
) -> Result<()> {
    tx.insert_audit(&AuditEntry::new(action, seller_id, product_id, message)).await?;
    Ok(())
}

async fn require_seller(tx: &mut dyn Transaction, user_id: &str) -> Result<User> {
    tx.find_user(user_id)
        .await?
        .filter(|u| u.is_seller)
        .ok_or_else(|| MarketError::Unauthorized("only sellers can manage products".to_string()))
}

/// The seller's own product in the requested deleted state.
async fn owned_product(tx: &mut dyn Transaction, seller_id: &str, product_id: &str, deleted: bool) -> Result<Product> {
    require_seller(tx, seller_id).await?;
    match tx.find_product(product_id).await? {
        Some(p) if p.seller_id != seller_id => {
            Err(MarketError::Unauthorized(format!("product {product_id} belongs to another seller")))
        }
        Some(p) if p.is_deleted == deleted => Ok(p),
        _ => Err(MarketError::not_found(format!("product {product_id}"))),
    }
}

async fn view(tx: &mut dyn Transaction, product: Product) -> Result<ProductView> {
    let seller_email = tx.find_user(&product.seller_id).await?.map(|u| u.email);
    Ok(ProductView {
        is_available: product.is_available(),
        id: product.id,
        seller_id: product.seller_id,
        seller_email,
        name: product.name,
        description: product.description,
        price: product.price,
        quantity: product.quantity,
        images: product.images,
        deleted_at: product.deleted_at,
        created_at: product.created_at,
    })
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MarketError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Prices are whole cents so order totals and per-line gateway charges agree.
fn validate_price(price: Decimal) -> Result<()> {
    if price < Decimal::ONE {
        return Err(MarketError::Validation("price must be at least 1".to_string()));
    }
    if price.normalize().scale() > 2 {
        return Err(MarketError::Validation("price must have at most two decimal places".to_string()));
    }
    Ok(())
}

fn product_error(err: ProductError) -> MarketError {
    MarketError::Validation(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::Fixture;

    fn widget(price: i64, quantity: u32) -> NewProduct {
        NewProduct {
            name: "Widget".into(),
            description: "A widget".into(),
            price: Decimal::new(price, 0),
            quantity,
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_only_sellers_create_products() {
        let fx = Fixture::new().await;
        let catalog = fx.catalog();

        let err = catalog.create_product(&fx.buyer.id, widget(10, 1)).await.unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
        let err = catalog.create_product(&fx.seller_a.id, widget(0, 1)).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let product = catalog.create_product(&fx.seller_a.id, widget(10, 3)).await.unwrap();
        let view = catalog.get_product(&product.id).await.unwrap();
        assert_eq!(view.seller_email.as_deref(), Some("s1@example.com"));
        assert!(view.is_available);
    }

    #[tokio::test]
    async fn test_prices_are_whole_cents() {
        let fx = Fixture::new().await;
        let catalog = fx.catalog();
        let priced = |price: Decimal| NewProduct { price, ..widget(0, 2) };

        let err = catalog.create_product(&fx.seller_a.id, priced(Decimal::new(1005, 3))).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
        let product = catalog.create_product(&fx.seller_a.id, priced(Decimal::new(1500, 3))).await.unwrap();
        assert_eq!(product.price, Decimal::new(150, 2));

        let patch = ProductPatch { price: Some(Decimal::new(12345, 4)), ..ProductPatch::default() };
        let err = catalog.update_product(&fx.seller_a.id, &product.id, patch).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_requires_owner() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 3).await;
        let catalog = fx.catalog();
        let patch = ProductPatch { price: Some(Decimal::new(12, 0)), ..ProductPatch::default() };

        let err = catalog.update_product(&fx.seller_b.id, &p.id, patch.clone()).await.unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
        let updated = catalog.update_product(&fx.seller_a.id, &p.id, patch).await.unwrap();
        assert_eq!(updated.price, Decimal::new(12, 0));
        assert_eq!(updated.name, "Widget");
    }

    #[tokio::test]
    async fn test_listing_search_and_paging() {
        let fx = Fixture::new().await;
        fx.product(&fx.seller_a, "Red lamp", 30, 1).await;
        fx.product(&fx.seller_a, "Blue lamp", 10, 1).await;
        fx.product(&fx.seller_b, "Chair", 20, 1).await;
        let catalog = fx.catalog();

        let lamps = catalog
            .list_products(ProductListing { search: Some("LAMP".into()), sort_by_price: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(lamps.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["Blue lamp", "Red lamp"]);

        let by_seller = catalog
            .list_products(ProductListing { search: Some("s2@".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_seller.len(), 1);

        let page = catalog.list_products(ProductListing { page: Some(2), limit: Some(2), ..Default::default() }).await;
        assert_eq!(page.unwrap().len(), 1);
        let err = catalog.list_products(ProductListing { limit: Some(101), ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_releases_cart_reservations() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 5).await;
        fx.cart().add_to_cart(&fx.buyer.id, &p.id, 3).await.unwrap();
        let catalog = fx.catalog();

        let deleted = catalog.delete_product(&fx.seller_a.id, &p.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.quantity, 5);
        assert_eq!(fx.cart_quantity(&fx.buyer.id, &p.id).await, None);
        assert!(matches!(catalog.get_product(&p.id).await, Err(MarketError::NotFound(_))));
        assert_eq!(catalog.deleted_products(&fx.seller_a.id).await.unwrap().len(), 1);

        let restored = catalog.restore_product(&fx.seller_a.id, &p.id).await.unwrap();
        assert!(!restored.is_deleted);
        assert!(catalog.get_product(&p.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_changes_leave_an_audit_trail() {
        let fx = Fixture::new().await;
        let catalog = fx.catalog();
        let p = catalog.create_product(&fx.seller_a.id, widget(10, 3)).await.unwrap();
        let patch = ProductPatch { price: Some(Decimal::new(12, 0)), quantity: Some(4), ..ProductPatch::default() };
        catalog.update_product(&fx.seller_a.id, &p.id, patch).await.unwrap();
        catalog.delete_product(&fx.seller_a.id, &p.id).await.unwrap();
        catalog.restore_product(&fx.seller_a.id, &p.id).await.unwrap();

        let trail = catalog.audit_trail(&fx.seller_a.id, &p.id).await.unwrap();
        let actions: Vec<AuditAction> = trail.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::CreateProduct, AuditAction::UpdateProduct, AuditAction::DeleteProduct, AuditAction::RestoreProduct]
        );
        assert!(trail.iter().all(|e| e.actor_id == fx.seller_a.id));
        assert_eq!(trail[1].message, "price, quantity");

        let err = catalog.audit_trail(&fx.seller_b.id, &p.id).await.unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_rejected_change_is_not_audited() {
        let fx = Fixture::new().await;
        let catalog = fx.catalog();
        let p = catalog.create_product(&fx.seller_a.id, widget(10, 3)).await.unwrap();
        let patch = ProductPatch { price: Some(Decimal::new(5, 1)), ..ProductPatch::default() };
        assert!(catalog.update_product(&fx.seller_a.id, &p.id, patch).await.is_err());

        assert_eq!(catalog.audit_trail(&fx.seller_a.id, &p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_after_window_fails_and_sweep_purges() {
        let fx = Fixture::new().await;
        let mut p = fx.product(&fx.seller_a, "Widget", 10, 5).await;
        p.soft_delete(Utc::now() - Duration::days(31)).unwrap();
        let mut tx = fx.tx().await;
        tx.update_product(&p).await.unwrap();
        tx.commit().await.unwrap();
        let catalog = fx.catalog();

        let err = catalog.restore_product(&fx.seller_a.id, &p.id).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        assert_eq!(catalog.purge_expired(Utc::now()).await.unwrap(), 1);
        assert!(fx.tx().await.find_product(&p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_keeps_recent_deletions() {
        let fx = Fixture::new().await;
        let p = fx.product(&fx.seller_a, "Widget", 10, 5).await;
        let catalog = fx.catalog();
        catalog.delete_product(&fx.seller_a.id, &p.id).await.unwrap();

        assert_eq!(catalog.purge_expired(Utc::now()).await.unwrap(), 0);
        assert_eq!(catalog.deleted_products(&fx.seller_a.id).await.unwrap().len(), 1);
    }
}
