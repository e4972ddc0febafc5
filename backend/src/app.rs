//! Explicit composition root.
//!
//! One `App` owns the cache pool, session store, router, event bus,
//! scheduler and cart coordinator, wired together at process start and
//! handed to the front door. No module-level singletons anywhere.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use agents::deps::{AgentDeps, AllowAllSecurity, PersistenceClient, WebshopClient};
use agents::{HandlerRegistry, Router, RouterConfig};
use cache::{CachePool, RateLimiter, ResponseCache};
use common::audit::{AuditLogger, AuditSink, TracingAuditSink};
use common::models::Product;
use marketing::{CartCoordinator, CartSource, EmailSender, RecoveryListener, SmsSender};
use scheduler::bus::{EventBus, EventType};
use scheduler::conflict::{ConflictMonitor, ConflictResolver};
use scheduler::types::{JobExecutor, JobKind};
use scheduler::SyncScheduler;
use session::SessionStore;

use crate::config::AppConfig;
use crate::error::AppError;

/// Inventory / price / order plumbing against the webshop, plus the
/// product feeds the conflict monitor compares. Implemented outside the
/// core (REST client or mock).
#[async_trait::async_trait]
pub trait SyncBackend: Send + Sync {
    async fn local_products(&self) -> anyhow::Result<Vec<Product>>;
    async fn remote_products(&self) -> anyhow::Result<Vec<Product>>;
    async fn sync_inventory(&self) -> anyhow::Result<serde_json::Value>;
    async fn sync_prices(&self) -> anyhow::Result<serde_json::Value>;
    async fn sync_orders(&self) -> anyhow::Result<serde_json::Value>;
}

/// External collaborators the core does not implement itself.
pub struct Collaborators {
    pub webshop: Arc<dyn WebshopClient>,
    pub persistence: Arc<dyn PersistenceClient>,
    pub sync_backend: Arc<dyn SyncBackend>,
    pub cart_source: Arc<dyn CartSource>,
    pub email: Arc<dyn EmailSender>,
    pub sms: Arc<dyn SmsSender>,
}

pub struct App {
    pub pool: Arc<CachePool>,
    pub sessions: Arc<SessionStore>,
    pub router: Arc<Router>,
    pub bus: Arc<EventBus>,
    pub scheduler: Arc<SyncScheduler>,
    pub coordinator: Arc<CartCoordinator>,
    pub resolver: Arc<ConflictResolver>,
    pub audit: AuditLogger,

    audit_task: Option<JoinHandle<()>>,
    monitor_task: Option<JoinHandle<()>>,
    config: AppConfig,
}

impl App {
    pub async fn build(config: AppConfig, collaborators: Collaborators) -> Result<Self, AppError> {
        Self::build_with_sink(config, collaborators, Arc::new(TracingAuditSink)).await
    }

    /// Same as [`App::build`] with a caller-supplied audit backend
    /// (tests use the in-memory sink).
    pub async fn build_with_sink(
        config: AppConfig,
        collaborators: Collaborators,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Result<Self, AppError> {
        let pool = if config.testing {
            info!("TESTING mode: using in-memory cache transport");
            Arc::new(CachePool::in_memory(config.cache.clone()))
        } else {
            Arc::new(
                CachePool::connect(config.cache.clone())
                    .await
                    .map_err(|e| AppError::CacheInit(e.to_string()))?,
            )
        };

        let (audit, audit_task) = AuditLogger::spawn(audit_sink);

        let sessions = Arc::new(SessionStore::new(pool.clone()));

        let deps = AgentDeps {
            user_context: serde_json::Map::new(),
            persistence: collaborators.persistence,
            webshop: collaborators.webshop,
            security: Arc::new(AllowAllSecurity),
            audit: audit.clone(),
        };

        let router = Arc::new(Router::new(
            sessions.clone(),
            RateLimiter::new(pool.clone()),
            ResponseCache::new(pool.clone()),
            HandlerRegistry::with_defaults(),
            deps,
            audit.clone(),
            RouterConfig {
                handler_timeout: config.handler_timeout,
                ..Default::default()
            },
        ));

        let bus = EventBus::new();

        let resolver = Arc::new(ConflictResolver::new());
        let monitor = Arc::new(ConflictMonitor::new(
            resolver.clone(),
            Some(bus.clone()),
            Some(pool.clone()),
        ));

        let coordinator = CartCoordinator::new(
            pool.clone(),
            collaborators.cart_source,
            collaborators.email,
            collaborators.sms,
            audit.clone(),
            config.marketing.clone(),
        );

        // Orders closing the loop on abandoned carts.
        bus.subscribe(
            EventType::OrderCreated,
            RecoveryListener::new(coordinator.clone()),
        );

        let executor = Arc::new(CoreJobExecutor {
            sync_backend: collaborators.sync_backend,
            monitor,
            coordinator: coordinator.clone(),
        });

        let scheduler =
            SyncScheduler::with_default_jobs(executor, bus.clone(), Some(pool.clone()));

        Ok(Self {
            pool,
            sessions,
            router,
            bus,
            scheduler,
            coordinator,
            resolver,
            audit,
            audit_task: Some(audit_task),
            monitor_task: None,
            config,
        })
    }

    /// Launch the background fabric: bus consumer, job loops, cache
    /// health monitor.
    pub fn start(&mut self) {
        self.bus.start();
        self.scheduler.start_all();
        self.monitor_task = Some(self.pool.spawn_monitor());
        info!("background fabric started");
    }

    /// Orderly shutdown: job loops cancelled first, in-flight turns get
    /// the grace period, then the bus drains and the audit channel is
    /// flushed.
    pub async fn shutdown(mut self) {
        info!("shutting down");

        self.scheduler.stop_all();
        if let Some(handle) = self.monitor_task.take() {
            handle.abort();
        }

        tokio::time::sleep(self.config.shutdown_grace).await;

        self.bus.stop().await;

        // Every component holds an audit handle; release them all, then
        // give the sink a bounded window to drain what is buffered.
        let audit_task = self.audit_task.take();
        drop(self);
        if let Some(handle) = audit_task {
            if tokio::time::timeout(std::time::Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!("audit sink did not drain in time");
            }
        }

        info!("shutdown complete");
    }
}

/// Job execution behind the scheduler: webshop syncs feed the conflict
/// monitor; the marketing jobs delegate to the coordinator.
struct CoreJobExecutor {
    sync_backend: Arc<dyn SyncBackend>,
    monitor: Arc<ConflictMonitor>,
    coordinator: Arc<CartCoordinator>,
}

#[async_trait::async_trait]
impl JobExecutor for CoreJobExecutor {
    async fn execute(&self, kind: JobKind) -> anyhow::Result<serde_json::Value> {
        match kind {
            JobKind::ProductSync => {
                let local = self.sync_backend.local_products().await?;
                let remote = self.sync_backend.remote_products().await?;
                let report = self.monitor.scan(&local, &remote).await;

                Ok(serde_json::json!({
                    "synced": remote.len(),
                    "conflicts_detected": report.conflicts_detected,
                    "conflicts_resolved": report.conflicts_resolved,
                    "alert_triggered": report.alert_triggered,
                }))
            }
            JobKind::InventorySync => self.sync_backend.sync_inventory().await,
            JobKind::PriceSync => self.sync_backend.sync_prices().await,
            JobKind::OrderSync => self.sync_backend.sync_orders().await,
            JobKind::AbandonedCartDetect => {
                let detected = self.coordinator.detect().await?;
                Ok(serde_json::json!({ "detected": detected }))
            }
            JobKind::Cleanup => {
                let purged = self.coordinator.cleanup().await?;
                Ok(serde_json::json!({ "purged": purged }))
            }
            // The scheduler decomposes FullSync before reaching us.
            JobKind::FullSync => anyhow::bail!("full_sync is composite and never executed directly"),
        }
    }
}
