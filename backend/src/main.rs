use std::sync::Arc;

use chrono::Utc;

use agents::deps::{PersistenceClient, WebshopClient};
use agents::types::Promotion;
use backend::{App, AppConfig, Collaborators, SyncBackend};
use common::logger::init_tracing;
use common::models::{Cart, Order, Product};
use marketing::{AbandonedCart, CartSource, EmailSender, SmsSender};

/// Stand-in collaborators until the real webshop / persistence / SMTP /
/// SMS wiring is attached by the deployment.
// TODO: replace with the UNAS REST client and the SendGrid/Twilio transports.
struct StubWebshop;

#[async_trait::async_trait]
impl WebshopClient for StubWebshop {
    async fn search_products(&self, _query: &str) -> anyhow::Result<Vec<Product>> {
        Ok(Vec::new())
    }

    async fn product_by_id(&self, _id: u64) -> anyhow::Result<Option<Product>> {
        Ok(None)
    }

    async fn order_by_id(&self, _order_id: &str) -> anyhow::Result<Option<Order>> {
        Ok(None)
    }

    async fn order_by_tracking(&self, _tracking: &str) -> anyhow::Result<Option<Order>> {
        Ok(None)
    }

    async fn popular_products(&self, _limit: usize) -> anyhow::Result<Vec<Product>> {
        Ok(Vec::new())
    }

    async fn active_promotions(&self) -> anyhow::Result<Vec<Promotion>> {
        Ok(Vec::new())
    }
}

struct StubPersistence;

#[async_trait::async_trait]
impl PersistenceClient for StubPersistence {
    async fn user_profile(&self, _user_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(None)
    }

    async fn recent_orders(&self, _user_id: &str, _limit: usize) -> anyhow::Result<Vec<Order>> {
        Ok(Vec::new())
    }
}

struct StubSyncBackend;

#[async_trait::async_trait]
impl SyncBackend for StubSyncBackend {
    async fn local_products(&self) -> anyhow::Result<Vec<Product>> {
        Ok(Vec::new())
    }

    async fn remote_products(&self) -> anyhow::Result<Vec<Product>> {
        Ok(Vec::new())
    }

    async fn sync_inventory(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "synced": 0, "at": Utc::now() }))
    }

    async fn sync_prices(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "synced": 0, "at": Utc::now() }))
    }

    async fn sync_orders(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "synced": 0, "cart_ids": [], "at": Utc::now() }))
    }
}

struct StubCartSource;

#[async_trait::async_trait]
impl CartSource for StubCartSource {
    async fn active_carts(&self) -> anyhow::Result<Vec<Cart>> {
        Ok(Vec::new())
    }
}

struct LogEmailSender;

#[async_trait::async_trait]
impl EmailSender for LogEmailSender {
    async fn send_abandoned_cart_email(
        &self,
        to: &str,
        cart: &AbandonedCart,
    ) -> anyhow::Result<()> {
        tracing::info!(to, cart_id = %cart.cart_id, "would send abandoned-cart email");
        Ok(())
    }
}

struct LogSmsSender;

#[async_trait::async_trait]
impl SmsSender for LogSmsSender {
    async fn send_abandoned_cart_sms(&self, to: &str, cart: &AbandonedCart) -> anyhow::Result<()> {
        tracing::info!(to, cart_id = %cart.cart_id, "would send abandoned-cart sms");
        Ok(())
    }
}

fn stub_collaborators() -> Collaborators {
    Collaborators {
        webshop: Arc::new(StubWebshop),
        persistence: Arc::new(StubPersistence),
        sync_backend: Arc::new(StubSyncBackend),
        cart_source: Arc::new(StubCartSource),
        email: Arc::new(LogEmailSender),
        sms: Arc::new(LogSmsSender),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    init_tracing(config.production);

    tracing::info!(testing = config.testing, "starting chatbuddy core");

    let mut app = App::build(config, stub_collaborators()).await?;
    app.start();

    tracing::info!("core running; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    app.shutdown().await;
    Ok(())
}
