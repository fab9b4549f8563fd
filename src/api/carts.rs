use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use super::error::ApiResult;
use super::extract::{validated, Buyer, JsonBody, PathParam};
use super::AppState;
use crate::domain::aggregates::{CartLine, CartView};
use crate::services::AddOutcome;

#[derive(Debug, Deserialize, Validate)]
pub struct CartRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

pub async fn get_cart(State(s): State<AppState>, Buyer(user): Buyer) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.cart.get_cart(&user.id).await?))
}

pub async fn add(
    State(s): State<AppState>,
    Buyer(user): Buyer,
    JsonBody(r): JsonBody<CartRequest>,
) -> ApiResult<(StatusCode, Json<AddOutcome>)> {
    let r = validated(r)?;
    let outcome = s.services.cart.add_to_cart(&user.id, &r.product_id, r.quantity).await?;
    let status = match outcome {
        AddOutcome::Added { .. } => StatusCode::CREATED,
        AddOutcome::AlreadyPresent { .. } | AddOutcome::Merged { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

pub async fn edit(
    State(s): State<AppState>,
    Buyer(user): Buyer,
    JsonBody(r): JsonBody<CartRequest>,
) -> ApiResult<Json<CartLine>> {
    let r = validated(r)?;
    Ok(Json(s.services.cart.edit_cart(&user.id, &r.product_id, r.quantity).await?))
}

pub async fn remove(
    State(s): State<AppState>,
    Buyer(user): Buyer,
    PathParam(product_id): PathParam<String>,
) -> ApiResult<StatusCode> {
    s.services.cart.remove_from_cart(&user.id, &product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
