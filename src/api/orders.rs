use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use super::error::ApiResult;
use super::extract::{validated, Buyer, CurrentUser, JsonBody, PathParam, QueryParams, Seller};
use super::AppState;
use crate::domain::aggregates::{Order, PaymentMethod};
use crate::services::{CheckoutSession, OrderView, ReconcileReport};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::PaymentIntent
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentParams {
    #[validate(length(min = 1))]
    pub payment_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentFormParams {
    #[validate(length(min = 1))]
    pub client_secret: String,
    #[validate(url)]
    pub success_url: String,
}

pub async fn create_payment(
    State(s): State<AppState>,
    Buyer(user): Buyer,
    JsonBody(r): JsonBody<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutSession>)> {
    let session = s.services.payments.create_payment(&user.id, r.method).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Landing endpoint after the buyer pays; also safe to poll.
pub async fn confirm_payment(
    State(s): State<AppState>,
    QueryParams(q): QueryParams<ConfirmPaymentParams>,
) -> ApiResult<Json<ReconcileReport>> {
    let q = validated(q)?;
    Ok(Json(s.services.payments.reconcile(&q.payment_id).await?))
}

pub async fn payment_form(
    State(s): State<AppState>,
    QueryParams(q): QueryParams<PaymentFormParams>,
) -> ApiResult<Html<String>> {
    let q = validated(q)?;
    Ok(Html(render_payment_form(&s.stripe_public_key, &q.client_secret, &q.success_url)))
}

pub async fn list(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(s.services.orders.list_orders(&user.id).await?))
}

pub async fn get_one(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<String>,
) -> ApiResult<Json<OrderView>> {
    Ok(Json(s.services.orders.get_order(&user.id, &id).await?))
}

pub async fn delivered(
    State(s): State<AppState>,
    Seller(seller): Seller,
    PathParam(id): PathParam<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(s.services.payments.mark_delivered(&seller.id, &id).await?))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn render_payment_form(public_key: &str, client_secret: &str, success_url: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Payment</title>
  <script src="https://js.stripe.com/v3/"></script>
</head>
<body>
  <form id="payment-form" data-key="{key}" data-secret="{secret}" data-return="{ret}">
    <div id="payment-element"></div>
    <button id="submit" type="submit">Pay</button>
    <div id="error-message"></div>
  </form>
  <script>
    const form = document.getElementById("payment-form");
    const stripe = Stripe(form.dataset.key);
    const elements = stripe.elements({{ clientSecret: form.dataset.secret }});
    elements.create("payment").mount("#payment-element");
    form.addEventListener("submit", async (event) => {{
      event.preventDefault();
      const {{ error }} = await stripe.confirmPayment({{
        elements,
        confirmParams: {{ return_url: form.dataset.return }},
      }});
      if (error) {{
        document.getElementById("error-message").textContent = error.message;
      }}
    }});
  </script>
</body>
</html>
"##,
        key = escape(public_key),
        secret = escape(client_secret),
        ret = escape(success_url),
    )
}
