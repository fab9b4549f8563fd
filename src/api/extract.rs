//! Caller identity and request validation.
//!
//! Authentication happens upstream; the gateway in front of this service forwards the
//! authenticated user's id in `X-User-Id`.

use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use super::error::ApiError;
use super::AppState;
use crate::domain::aggregates::User;
use crate::MarketError;

pub const USER_HEADER: &str = "x-user-id";

/// Any known user.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// A user who shops (not a seller).
#[derive(Clone, Debug)]
pub struct Buyer(pub User);

/// A user who sells.
#[derive(Clone, Debug)]
pub struct Seller(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                tracing::debug!(uri = %parts.uri, "Missing user header");
                MarketError::Unauthorized("missing X-User-Id header".to_string())
            })?;

        let mut tx = state.store.begin().await.map_err(MarketError::from)?;
        let user = tx
            .find_user(user_id)
            .await
            .map_err(MarketError::from)?
            .ok_or_else(|| MarketError::Unauthorized(format!("unknown user {user_id}")))?;

        let current = CurrentUser(user);
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Buyer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.is_seller {
            return Err(MarketError::Unauthorized("sellers cannot shop".to_string()).into());
        }
        Ok(Buyer(user))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Seller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_seller {
            return Err(MarketError::Unauthorized("seller account required".to_string()).into());
        }
        Ok(Seller(user))
    }
}

/// `Json` whose decode failures are reported as `validation` errors.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

/// `Query` whose decode failures are reported as `validation` errors.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

/// `Path` whose decode failures are reported as `validation` errors.
#[derive(Debug)]
pub struct PathParam<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| MarketError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| MarketError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| MarketError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub fn validated<T: Validate>(value: T) -> Result<T, ApiError> {
    value.validate().map_err(|e| MarketError::Validation(e.to_string()))?;
    Ok(value)
}
