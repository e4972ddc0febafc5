//! Bus subscriber that marks carts recovered when orders come in.

use std::sync::Arc;

use tracing::debug;

use scheduler::bus::{Event, EventHandler};

use crate::coordinator::CartCoordinator;

/// Listens for `OrderCreated` events and clears the follow-up pipeline
/// for any cart the order references. Accepts a single `cart_id` or a
/// `result.cart_ids` list in the payload.
pub struct RecoveryListener {
    coordinator: Arc<CartCoordinator>,
}

impl RecoveryListener {
    pub fn new(coordinator: Arc<CartCoordinator>) -> Arc<Self> {
        Arc::new(Self { coordinator })
    }

    fn cart_ids(payload: &serde_json::Value) -> Vec<String> {
        if let Some(id) = payload.get("cart_id").and_then(|v| v.as_str()) {
            return vec![id.to_string()];
        }

        payload
            .get("result")
            .and_then(|r| r.get("cart_ids"))
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl EventHandler for RecoveryListener {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        for cart_id in Self::cart_ids(&event.payload) {
            if self.coordinator.mark_recovered(&cart_id).await? {
                debug!(cart_id = %cart_id, "cart marked recovered from order event");
            }
        }
        Ok(())
    }
}
