//! HTTP surface. Handlers stay thin: extract, validate, call a service, serialize.

pub mod carts;
pub mod error;
pub mod extract;
pub mod orders;
pub mod products;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::Services;
use crate::store::Store;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub store: Arc<dyn Store>,
    pub stripe_public_key: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "marketshop"})) }))
        .route("/products", get(products::list).post(products::create))
        .route("/products/mine", get(products::mine))
        .route("/products/deleted", get(products::deleted))
        .route("/products/:id", get(products::get_one).put(products::update).delete(products::delete))
        .route("/products/:id/restore", put(products::restore))
        .route("/products/:id/audit", get(products::audit))
        .route("/carts", get(carts::get_cart).post(carts::add).put(carts::edit))
        .route("/carts/:product_id", delete(carts::remove))
        .route("/orders", get(orders::list))
        .route("/orders/create-payment", post(orders::create_payment))
        .route("/orders/confirm-payment", get(orders::confirm_payment))
        .route("/orders/payment_form", get(orders::payment_form))
        .route("/orders/:id", get(orders::get_one))
        .route("/orders/:id/delivered", put(orders::delivered))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::services::{AddPolicy, CheckoutUrls};
    use crate::test_support::Fixture;

    fn app(fx: &Fixture) -> Router {
        let urls = CheckoutUrls::new("http://shop.test", "http://shop.test/orders/confirm-payment", "usd").unwrap();
        let services = Services::new(
            fx.shared_store(),
            Arc::new(fx.gateway.clone()),
            fx.notifier.clone(),
            urls,
            AddPolicy::KeepExisting,
            chrono::Duration::days(30),
        );
        router(AppState { services, store: fx.shared_store(), stripe_public_key: "pk_test".into() })
    }

    async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(extract::USER_HEADER, user);
        }
        let request = match body {
            Some(body) => request.header("content-type", "application/json").body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let fx = Fixture::new().await;
        let (status, body) = call(&app(&fx), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_cart_requires_known_buyer() {
        let fx = Fixture::new().await;
        let app = app(&fx);

        let (status, body) = call(&app, "GET", "/carts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");
        let (status, _) = call(&app, "GET", "/carts", Some("S1"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(&app, "GET", "/carts", Some("U1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_invalid_body_is_rejected() {
        let fx = Fixture::new().await;
        let (status, body) =
            call(&app(&fx), "POST", "/carts", Some("U1"), Some(json!({"product_id": "P1", "quantity": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_undecodable_requests_use_error_body() {
        let fx = Fixture::new().await;
        let app = app(&fx);

        let (status, body) =
            call(&app, "POST", "/carts", Some("U1"), Some(json!({"product_id": "P1", "quantity": -1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, body) = call(&app, "GET", "/products?page=first", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let request = Request::builder()
            .method("POST")
            .uri("/carts")
            .header(extract::USER_HEADER, "U1")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "validation");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_and_confirm_over_http() {
        let fx = Fixture::new().await;
        let a = fx.product(&fx.seller_a, "A", 10, 5).await;
        let b = fx.product(&fx.seller_b, "B", 5, 5).await;
        let app = app(&fx);

        let (status, body) = call(&app, "POST", "/carts", Some("U1"), Some(json!({"product_id": a.id, "quantity": 2}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "added");
        let (status, _) = call(&app, "POST", "/carts", Some("U1"), Some(json!({"product_id": b.id, "quantity": 1}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&app, "POST", "/carts", Some("U1"), Some(json!({"product_id": b.id, "quantity": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "already_present");

        let (status, session) =
            call(&app, "POST", "/orders/create-payment", Some("U1"), Some(json!({"method": "payment_intent"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let payment_id = session["payment_id"].as_str().unwrap().to_string();
        let confirm = format!("/orders/confirm-payment?payment_id={payment_id}");

        let (status, body) = call(&app, "GET", &confirm, None, None).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["kind"], "payment_incomplete");

        fx.gateway.complete(&payment_id);
        let (status, report) = call(&app, "GET", &confirm, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["orders"].as_array().unwrap().len(), 2);
        let (status, body) = call(&app, "GET", &confirm, None, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "already_processed");

        let (status, orders) = call(&app, "GET", "/orders", Some("S1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(orders[0]["role"], "seller");
        assert_eq!(orders[0]["counterparty_email"], "buyer@example.com");
        let order_id = orders[0]["id"].as_str().unwrap().to_string();

        let (status, order) = call(&app, "PUT", &format!("/orders/{order_id}/delivered"), Some("S1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "delivered");
    }

    #[tokio::test]
    async fn test_payment_form_renders() {
        let fx = Fixture::new().await;
        let request = Request::builder()
            .uri("/orders/payment_form?client_secret=pi_1_secret&success_url=http%3A%2F%2Fshop.test%2Fok")
            .body(Body::empty())
            .unwrap();
        let response = app(&fx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("pi_1_secret"));
    }
}
