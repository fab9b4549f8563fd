//! Stripe integration via REST API (no SDK dependency)

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{GatewayError, GatewayResult, GatewayStatus, LinkLineItem, PaymentGateway, PaymentIntent, PaymentLink};
use crate::domain::aggregates::PaymentMethod;
use crate::domain::value_objects::Money;

const STRIPE_API: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_base_url(secret_key, STRIPE_API)
    }

    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), secret_key: secret_key.into(), base_url: base_url.into() }
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> GatewayResult<Value> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await?;
        Self::read_body(resp).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> GatewayResult<Value> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(query)
            .send()
            .await?;
        Self::read_body(resp).await
    }

    async fn read_body(resp: reqwest::Response) -> GatewayResult<Value> {
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            return Err(GatewayError::Rejected(format!("{status}: {message}")));
        }
        Ok(body)
    }
}

fn field(body: &Value, name: &str) -> GatewayResult<String> {
    body[name]
        .as_str()
        .map(String::from)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("missing '{name}' in {body}")))
}

/// Maps a PaymentIntent status onto the gateway-neutral status.
fn intent_status(status: &str) -> GatewayStatus {
    match status {
        "succeeded" => GatewayStatus::Succeeded,
        "canceled" => GatewayStatus::Failed,
        _ => GatewayStatus::Pending,
    }
}

/// A payment link has succeeded once any checkout session opened from it has been paid.
fn link_status(sessions: &Value) -> GatewayStatus {
    let paid = sessions["data"]
        .as_array()
        .is_some_and(|data| data.iter().any(|s| s["payment_status"] == "paid"));
    if paid { GatewayStatus::Succeeded } else { GatewayStatus::Pending }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, amount), fields(value = %amount.amount(), currency = amount.currency()))]
    async fn create_intent(&self, amount: &Money) -> GatewayResult<PaymentIntent> {
        let form = vec![
            ("amount".to_string(), amount.minor_units()?.to_string()),
            ("currency".to_string(), amount.currency().to_string()),
            ("payment_method_types[]".to_string(), "card".to_string()),
        ];
        let body = self.post_form("payment_intents", &form).await?;
        let intent = PaymentIntent { id: field(&body, "id")?, client_secret: field(&body, "client_secret")? };
        debug!(intent_id = %intent.id, "Stripe payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self, unit_amount))]
    async fn create_price_line(&self, unit_amount: &Money, name: &str) -> GatewayResult<String> {
        let form = vec![
            ("currency".to_string(), unit_amount.currency().to_string()),
            ("unit_amount".to_string(), unit_amount.minor_units()?.to_string()),
            ("product_data[name]".to_string(), name.to_string()),
        ];
        let body = self.post_form("prices", &form).await?;
        field(&body, "id")
    }

    #[instrument(skip(self, line_items), fields(lines = line_items.len()))]
    async fn create_payment_link(&self, line_items: &[LinkLineItem]) -> GatewayResult<PaymentLink> {
        let mut form = Vec::with_capacity(line_items.len() * 2);
        for (i, item) in line_items.iter().enumerate() {
            form.push((format!("line_items[{i}][price]"), item.price_id.clone()));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }
        let body = self.post_form("payment_links", &form).await?;
        Ok(PaymentLink { id: field(&body, "id")?, url: field(&body, "url")? })
    }

    #[instrument(skip(self))]
    async fn set_redirect(&self, link_id: &str, url: &str) -> GatewayResult<()> {
        let form = vec![
            ("after_completion[type]".to_string(), "redirect".to_string()),
            ("after_completion[redirect][url]".to_string(), url.to_string()),
        ];
        self.post_form(&format!("payment_links/{link_id}"), &form).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_status(&self, method: PaymentMethod, payment_id: &str) -> GatewayResult<GatewayStatus> {
        match method {
            PaymentMethod::PaymentIntent => {
                let body = self.get(&format!("payment_intents/{payment_id}"), &[]).await?;
                Ok(intent_status(&field(&body, "status")?))
            }
            PaymentMethod::PaymentLink => {
                let body = self.get("checkout/sessions", &[("payment_link", payment_id), ("limit", "100")]).await?;
                Ok(link_status(&body))
            }
        }
    }
}
