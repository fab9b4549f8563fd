//! MarketShop - multi-seller marketplace backend

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketshop::api::{self, AppState};
use marketshop::config::{Config, GatewayBackend, StoreBackend};
use marketshop::gateway::{MockGateway, PaymentGateway, StripeGateway};
use marketshop::jobs::SoftDeleteSweeper;
use marketshop::notify::{LogNotifier, NatsNotifier, NotificationSender};
use marketshop::services::{CheckoutUrls, Services};
use marketshop::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.store {
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().context("DATABASE_URL is required for the postgres store")?;
            let store = PgStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match config.gateway {
        GatewayBackend::Stripe => {
            let key = config.stripe_secret_key.clone().context("STRIPE_SECRET_KEY is required for the stripe gateway")?;
            Arc::new(StripeGateway::new(key))
        }
        GatewayBackend::Mock => {
            tracing::warn!("Using the mock payment gateway");
            Arc::new(MockGateway::new())
        }
    };

    let notifier: Arc<dyn NotificationSender> = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Arc::new(NatsNotifier::new(client, config.nats_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let urls = CheckoutUrls::new(&config.api_url, &config.success_url, &config.currency)?;
    let services = Services::new(
        store.clone(),
        gateway,
        notifier,
        urls,
        config.cart_add_policy,
        config.restore_window(),
    );

    let (stop, stop_signal) = watch::channel(false);
    let sweeper = SoftDeleteSweeper::new(services.catalog.clone(), config.cleanup_interval, stop_signal).spawn();

    let state = AppState { services, store: store.clone(), stripe_public_key: config.stripe_public_key.clone() };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("MarketShop listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    stop.send(true).ok();
    sweeper.await.ok();
    store.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
