use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::{ErrorKind, MarketError};

/// JSON error body: `{"kind": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub MarketError);

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::PaymentIncomplete => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::AlreadyProcessed => StatusCode::CONFLICT,
        ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::GatewayError => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match kind {
            ErrorKind::Internal => {
                tracing::error!(error = %self.0, "Internal error");
                "internal server error".to_string()
            }
            ErrorKind::GatewayError => {
                tracing::warn!(error = %self.0, "Payment gateway error");
                "payment provider error".to_string()
            }
            _ => self.0.to_string(),
        };
        (status_for(kind), Json(ErrorBody { kind, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
