//! Service configuration, read from the environment (and `.env` when present).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::value_objects::minor_unit_exponent;
use crate::services::cart::AddPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable '{0}'")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayBackend {
    Stripe,
    Mock,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Public base URL of this service, used to build payment form links.
    pub api_url: String,
    /// Where buyers land after paying; `payment_id` is appended as a query parameter.
    pub success_url: String,
    pub currency: String,
    pub gateway: GatewayBackend,
    pub stripe_secret_key: Option<String>,
    pub stripe_public_key: String,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub cart_add_policy: AddPolicy,
    pub restore_window_days: i64,
    pub cleanup_interval: Duration,
}

fn var(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { name, reason: e.to_string() }),
        None => Ok(default),
    }
}

impl FromStr for StoreBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{other}'")),
        }
    }
}

impl FromStr for GatewayBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "mock" => Ok(Self::Mock),
            other => Err(format!("expected 'stripe' or 'mock', got '{other}'")),
        }
    }
}

/// Catalog prices carry at most two decimals, so the checkout currency must use cents.
fn parse_currency(raw: Option<String>) -> Result<String, ConfigError> {
    let currency = raw.unwrap_or_else(|| "usd".to_string()).trim().to_lowercase();
    if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_lowercase()) {
        return Err(ConfigError::Invalid { name: "CURRENCY", reason: format!("'{currency}' is not an ISO 4217 code") });
    }
    if minor_unit_exponent(&currency) != 2 {
        return Err(ConfigError::Invalid {
            name: "CURRENCY",
            reason: format!("'{currency}' does not use two decimal places"),
        });
    }
    Ok(currency)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = parse("PORT", 8083u16)?;
        let store = parse("STORE", StoreBackend::Postgres)?;
        let database_url = var("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let gateway = parse("PAYMENT_GATEWAY", GatewayBackend::Stripe)?;
        let stripe_secret_key = var("STRIPE_SECRET_KEY");
        if gateway == GatewayBackend::Stripe && stripe_secret_key.is_none() {
            return Err(ConfigError::Missing("STRIPE_SECRET_KEY"));
        }

        let api_url = var("API_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let success_url = var("SUCCESS_URL").unwrap_or_else(|| format!("{api_url}/orders/confirm-payment"));

        let restore_window_days = parse("RESTORE_WINDOW_DAYS", 30i64)?;
        if restore_window_days < 0 {
            return Err(ConfigError::Invalid { name: "RESTORE_WINDOW_DAYS", reason: "must not be negative".into() });
        }
        let cleanup_secs = parse("CLEANUP_INTERVAL_SECS", 86_400u64)?;
        if cleanup_secs == 0 {
            return Err(ConfigError::Invalid { name: "CLEANUP_INTERVAL_SECS", reason: "must be positive".into() });
        }

        let config = Self {
            port,
            store,
            database_url,
            max_connections: parse("DATABASE_MAX_CONNECTIONS", 10u32)?,
            api_url,
            success_url,
            currency: parse_currency(var("CURRENCY"))?,
            gateway,
            stripe_secret_key,
            stripe_public_key: var("STRIPE_PUBLIC_KEY").unwrap_or_default(),
            nats_url: var("NATS_URL"),
            nats_subject_prefix: var("NATS_SUBJECT_PREFIX").unwrap_or_else(|| "marketshop.notifications".to_string()),
            cart_add_policy: parse("CART_ADD_POLICY", AddPolicy::KeepExisting)?,
            restore_window_days,
            cleanup_interval: Duration::from_secs(cleanup_secs),
        };
        tracing::info!(store = ?config.store, gateway = ?config.gateway, port = config.port, "Configuration loaded");
        Ok(config)
    }

    pub fn restore_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.restore_window_days)
    }
}
