use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use super::error::ApiResult;
use super::extract::{validated, JsonBody, PathParam, QueryParams, Seller};
use super::AppState;
use crate::domain::aggregates::{AuditEntry, Product};
use crate::services::catalog::{NewProduct, ProductListing, ProductPatch, ProductView};

fn valid_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ONE {
        return Err(ValidationError::new("price_below_minimum"));
    }
    if price.normalize().scale() > 2 {
        return Err(ValidationError::new("price_sub_cent"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(custom = "valid_price")]
    pub price: Decimal,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    #[validate(custom = "valid_price")]
    pub price: Option<Decimal>,
    pub quantity: Option<u32>,
    pub images: Option<Vec<String>>,
}

pub async fn list(
    State(s): State<AppState>,
    QueryParams(q): QueryParams<ProductListing>,
) -> ApiResult<Json<Vec<ProductView>>> {
    Ok(Json(s.services.catalog.list_products(q).await?))
}

pub async fn get_one(State(s): State<AppState>, PathParam(id): PathParam<String>) -> ApiResult<Json<ProductView>> {
    Ok(Json(s.services.catalog.get_product(&id).await?))
}

pub async fn create(
    State(s): State<AppState>,
    Seller(seller): Seller,
    JsonBody(r): JsonBody<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let r = validated(r)?;
    let input = NewProduct { name: r.name, description: r.description, price: r.price, quantity: r.quantity, images: r.images };
    let product = s.services.catalog.create_product(&seller.id, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(s): State<AppState>,
    Seller(seller): Seller,
    PathParam(id): PathParam<String>,
    JsonBody(r): JsonBody<UpdateProductRequest>,
) -> ApiResult<Json<Product>> {
    let r = validated(r)?;
    let patch = ProductPatch { name: r.name, description: r.description, price: r.price, quantity: r.quantity, images: r.images };
    Ok(Json(s.services.catalog.update_product(&seller.id, &id, patch).await?))
}

pub async fn delete(
    State(s): State<AppState>,
    Seller(seller): Seller,
    PathParam(id): PathParam<String>,
) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.delete_product(&seller.id, &id).await?))
}

pub async fn restore(
    State(s): State<AppState>,
    Seller(seller): Seller,
    PathParam(id): PathParam<String>,
) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.restore_product(&seller.id, &id).await?))
}

pub async fn audit(
    State(s): State<AppState>,
    Seller(seller): Seller,
    PathParam(id): PathParam<String>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(s.services.catalog.audit_trail(&seller.id, &id).await?))
}

pub async fn mine(State(s): State<AppState>, Seller(seller): Seller) -> ApiResult<Json<Vec<ProductView>>> {
    Ok(Json(s.services.catalog.seller_products(&seller.id).await?))
}

pub async fn deleted(State(s): State<AppState>, Seller(seller): Seller) -> ApiResult<Json<Vec<ProductView>>> {
    Ok(Json(s.services.catalog.deleted_products(&seller.id).await?))
}
