use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use agents::deps::{PersistenceClient, WebshopClient};
use agents::types::{HandlerKind, Promotion};
use backend::{App, AppConfig, Collaborators, SyncBackend};
use cache::CacheConfig;
use common::audit::MemoryAuditSink;
use common::models::{Cart, CartItem, Order, Product};
use marketing::{AbandonedCart, CartSource, EmailSender, MarketingConfig, SmsSender};
use scheduler::bus::{Event, EventType};
use scheduler::types::{JobConfig, JobKind};

fn mk_product(id: u64, price: f64, stock: i64) -> Product {
    Product {
        id,
        sku: format!("SKU-{id}"),
        name: format!("Telefon {id}"),
        description: None,
        category_id: 1,
        price,
        stock,
        updated_at: Utc::now(),
    }
}

struct TestWebshop;

#[async_trait::async_trait]
impl WebshopClient for TestWebshop {
    async fn search_products(&self, _query: &str) -> anyhow::Result<Vec<Product>> {
        Ok(vec![mk_product(1, 450_000.0, 4)])
    }

    async fn product_by_id(&self, id: u64) -> anyhow::Result<Option<Product>> {
        Ok(Some(mk_product(id, 450_000.0, 4)))
    }

    async fn order_by_id(&self, _order_id: &str) -> anyhow::Result<Option<Order>> {
        Ok(None)
    }

    async fn order_by_tracking(&self, _tracking: &str) -> anyhow::Result<Option<Order>> {
        Ok(None)
    }

    async fn popular_products(&self, _limit: usize) -> anyhow::Result<Vec<Product>> {
        Ok(vec![mk_product(1, 450_000.0, 4)])
    }

    async fn active_promotions(&self) -> anyhow::Result<Vec<Promotion>> {
        Ok(Vec::new())
    }
}

struct TestPersistence;

#[async_trait::async_trait]
impl PersistenceClient for TestPersistence {
    async fn user_profile(&self, _user_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(None)
    }

    async fn recent_orders(&self, _user_id: &str, _limit: usize) -> anyhow::Result<Vec<Order>> {
        Ok(Vec::new())
    }
}

/// Local and remote disagree on product 1 (price and stock).
struct DivergentSyncBackend;

#[async_trait::async_trait]
impl SyncBackend for DivergentSyncBackend {
    async fn local_products(&self) -> anyhow::Result<Vec<Product>> {
        Ok(vec![mk_product(1, 100.0, 50)])
    }

    async fn remote_products(&self) -> anyhow::Result<Vec<Product>> {
        Ok(vec![mk_product(1, 110.0, 30)])
    }

    async fn sync_inventory(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "synced": 1 }))
    }

    async fn sync_prices(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "synced": 1 }))
    }

    async fn sync_orders(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "synced": 0, "cart_ids": [] }))
    }
}

struct AbandonedCartSource;

#[async_trait::async_trait]
impl CartSource for AbandonedCartSource {
    async fn active_carts(&self) -> anyhow::Result<Vec<Cart>> {
        Ok(vec![Cart {
            cart_id: "cart_001".to_string(),
            user_id: "u1".to_string(),
            items: vec![CartItem {
                product_id: 1,
                name: "Telefon 1".to_string(),
                quantity: 1,
                unit_price: 25_000.0,
            }],
            total_value: 25_000.0,
            last_activity: Utc::now() - ChronoDuration::minutes(45),
            customer_email: Some("u1@example.com".to_string()),
            customer_phone: Some("+36301112233".to_string()),
        }])
    }
}

struct NoopEmail;

#[async_trait::async_trait]
impl EmailSender for NoopEmail {
    async fn send_abandoned_cart_email(
        &self,
        _to: &str,
        _cart: &AbandonedCart,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

struct NoopSms;

#[async_trait::async_trait]
impl SmsSender for NoopSms {
    async fn send_abandoned_cart_sms(&self, _to: &str, _cart: &AbandonedCart) -> anyhow::Result<()> {
        Ok(())
    }
}

fn testing_config() -> AppConfig {
    AppConfig {
        cache: CacheConfig::default(),
        marketing: MarketingConfig::default(),
        handler_timeout: Duration::from_secs(30),
        shutdown_grace: Duration::from_millis(10),
        testing: true,
        production: false,
    }
}

fn collaborators() -> Collaborators {
    Collaborators {
        webshop: Arc::new(TestWebshop),
        persistence: Arc::new(TestPersistence),
        sync_backend: Arc::new(DivergentSyncBackend),
        cart_source: Arc::new(AbandonedCartSource),
        email: Arc::new(NoopEmail),
        sms: Arc::new(NoopSms),
    }
}

async fn mk_app() -> (App, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::default());
    let app = App::build_with_sink(testing_config(), collaborators(), sink.clone())
        .await
        .expect("app builds in testing mode");
    (app, sink)
}

#[tokio::test]
async fn full_stack_turn_routes_and_audits() {
    let (app, sink) = mk_app().await;

    let response = app
        .router
        .route("Milyen telefonok vannak?", "u1", "s1", serde_json::Map::new())
        .await;

    assert_eq!(response.handler_kind, HandlerKind::Product);
    assert!(response.confidence >= 0.7);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subsystem, "router");
}

#[tokio::test]
async fn product_sync_job_resolves_conflicts() {
    let (app, _sink) = mk_app().await;

    let config = JobConfig::new(JobKind::ProductSync, Duration::from_secs(3600));
    let run = app.scheduler.run_once(&config.job_id(), &config).await;

    assert!(run.success);
    let result = run.result.unwrap();
    assert_eq!(result["conflicts_detected"], 2);
    assert_eq!(result["conflicts_resolved"], 2);

    let stats = app.resolver.stats();
    assert_eq!(stats.total, 2);
    assert!((stats.resolution_rate - 100.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn cart_detection_job_creates_record_and_follow_ups() {
    let (app, _sink) = mk_app().await;

    let config = JobConfig::new(JobKind::AbandonedCartDetect, Duration::from_secs(900));
    let run = app.scheduler.run_once(&config.job_id(), &config).await;

    assert!(run.success);
    assert_eq!(run.result.as_ref().unwrap()["detected"], 1);

    let record = app.coordinator.record("cart_001").await.unwrap().unwrap();
    assert!(!record.email_sent);

    // Both follow-up timers fire in virtual time.
    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    let record = app.coordinator.record("cart_001").await.unwrap().unwrap();
    assert!(record.email_sent);
    assert!(record.sms_sent);
    assert_eq!(record.follow_up_count, 2);
}

#[tokio::test]
async fn order_created_event_recovers_cart() {
    let (app, _sink) = mk_app().await;
    // Start only the bus; the job loops would add noise here.
    app.bus.start();

    let config = JobConfig::new(JobKind::AbandonedCartDetect, Duration::from_secs(900));
    app.scheduler.run_once(&config.job_id(), &config).await;

    app.bus.publish(Event::new(
        EventType::OrderCreated,
        serde_json::json!({ "cart_id": "cart_001" }),
        "test",
    ));

    // Let the bus consumer deliver.
    for _ in 0..100 {
        if app.bus.queue_depth() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let record = app.coordinator.record("cart_001").await.unwrap().unwrap();
    assert!(record.recovered);

    app.shutdown().await;
}
