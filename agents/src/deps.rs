//! Dependency bundle handed to every handler invocation, and the narrow
//! collaborator interfaces it carries. The concrete persistence and
//! webshop clients live outside the core; tests and the composition
//! root supply implementations.

use std::sync::Arc;

use anyhow::Result;

use common::audit::AuditLogger;
use common::models::{Order, Product};

use crate::types::Promotion;

/// Read access to the persistence store, as far as handlers need it.
#[async_trait::async_trait]
pub trait PersistenceClient: Send + Sync {
    async fn user_profile(&self, user_id: &str) -> Result<Option<serde_json::Value>>;
    async fn recent_orders(&self, user_id: &str, limit: usize) -> Result<Vec<Order>>;
}

/// Read access to the webshop.
#[async_trait::async_trait]
pub trait WebshopClient: Send + Sync {
    async fn search_products(&self, query: &str) -> Result<Vec<Product>>;
    async fn product_by_id(&self, id: u64) -> Result<Option<Product>>;
    async fn order_by_id(&self, order_id: &str) -> Result<Option<Order>>;
    async fn order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>>;
    async fn popular_products(&self, limit: usize) -> Result<Vec<Product>>;
    async fn active_promotions(&self) -> Result<Vec<Promotion>>;
}

pub trait SecurityContext: Send + Sync {
    fn is_authorized(&self, user_id: &str, operation: &str) -> bool;
}

/// Permissive default; real policy enforcement lives outside the core.
pub struct AllowAllSecurity;

impl SecurityContext for AllowAllSecurity {
    fn is_authorized(&self, _user_id: &str, _operation: &str) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct AgentDeps {
    pub user_context: serde_json::Map<String, serde_json::Value>,
    pub persistence: Arc<dyn PersistenceClient>,
    pub webshop: Arc<dyn WebshopClient>,
    pub security: Arc<dyn SecurityContext>,
    pub audit: AuditLogger,
}

impl AgentDeps {
    pub fn user_id(&self) -> Option<&str> {
        self.user_context.get("user_id").and_then(|v| v.as_str())
    }

    /// Copy of the bundle with this turn's context merged over the base.
    pub fn with_context(&self, context: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut merged = self.user_context.clone();
        merged.extend(context);
        Self {
            user_context: merged,
            ..self.clone()
        }
    }
}
