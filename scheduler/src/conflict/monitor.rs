//! Sync-time conflict monitoring.
//!
//! Compares parallel local/remote product lists, runs every detector,
//! auto-resolves what the strategy table allows, and raises an alert
//! (plus a bus event) when one scan detects too many conflicts.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use cache::{CachePool, Namespace};
use common::models::Product;

use crate::bus::{Event, EventBus, EventType};

use super::resolver::{
    ConflictResolver, detect_category_mismatch, detect_data_integrity_issues,
    detect_duplicate_products, detect_price_conflict, detect_stock_conflict,
};
use super::types::{Conflict, ResolutionRecord, ResolutionStrategy};

const DEFAULT_ALERT_THRESHOLD: usize = 5;
/// Slice of recent resolutions persisted through the cache per scan.
const PERSISTED_RESOLUTIONS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub alert_triggered: bool,
    pub conflict_types: Vec<String>,
    pub resolutions: Vec<ResolutionRecord>,
}

pub struct ConflictMonitor {
    resolver: Arc<ConflictResolver>,
    bus: Option<Arc<EventBus>>,
    pool: Option<Arc<CachePool>>,
    alert_threshold: usize,
}

impl ConflictMonitor {
    pub fn new(
        resolver: Arc<ConflictResolver>,
        bus: Option<Arc<EventBus>>,
        pool: Option<Arc<CachePool>>,
    ) -> Self {
        Self {
            resolver,
            bus,
            pool,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }

    pub fn with_alert_threshold(mut self, threshold: usize) -> Self {
        self.alert_threshold = threshold.max(1);
        self
    }

    /// Compare one sync batch. Conflicts whose strategy is not manual
    /// review are resolved on the spot; the rest are recorded
    /// unresolved for the review queue.
    #[instrument(skip_all, target = "conflict", fields(local = local.len(), remote = remote.len()))]
    pub async fn scan(&self, local: &[Product], remote: &[Product]) -> ScanReport {
        let mut conflicts = Vec::new();

        // Pairwise detectors over products present on both sides.
        for local_product in local {
            let Some(remote_product) = remote.iter().find(|r| r.id == local_product.id) else {
                continue;
            };

            conflicts.extend(detect_price_conflict(local_product, remote_product));
            conflicts.extend(detect_stock_conflict(local_product, remote_product));
            conflicts.extend(detect_category_mismatch(local_product, remote_product));
        }

        // Duplicates across the combined view.
        let combined: Vec<Product> = local.iter().chain(remote.iter()).cloned().collect();
        conflicts.extend(detect_duplicate_products(&combined));

        // Per-record integrity.
        for product in &combined {
            conflicts.extend(detect_data_integrity_issues(product));
        }

        let detected = conflicts.len();
        let mut conflict_types: Vec<String> = conflicts
            .iter()
            .map(|c| c.conflict_type.as_str().to_string())
            .collect();
        conflict_types.sort();
        conflict_types.dedup();

        let resolutions = self.resolve_batch(conflicts);

        let alert_triggered = detected >= self.alert_threshold;
        if alert_triggered {
            warn!(
                detected,
                threshold = self.alert_threshold,
                types = ?conflict_types,
                "conflict alert threshold reached"
            );
            if let Some(bus) = &self.bus {
                bus.publish(Event::new(
                    EventType::ConflictDetected,
                    serde_json::json!({
                        "detected": detected,
                        "types": conflict_types,
                    }),
                    "conflict_monitor",
                ));
            }
        } else if detected > 0 {
            info!(detected, resolved = resolutions.len(), "sync conflicts handled");
        }

        self.persist_resolutions(&resolutions).await;

        ScanReport {
            conflicts_detected: detected,
            conflicts_resolved: resolutions.len(),
            alert_triggered,
            conflict_types,
            resolutions,
        }
    }

    fn resolve_batch(&self, conflicts: Vec<Conflict>) -> Vec<ResolutionRecord> {
        let mut resolutions = Vec::with_capacity(conflicts.len());

        for conflict in conflicts {
            let strategy = conflict
                .resolution_strategy
                .unwrap_or_else(|| self.resolver.rule_for(conflict.conflict_type));

            let auto_resolvable = strategy != ResolutionStrategy::ManualReview
                && self.resolver.auto_resolve_enabled();

            if auto_resolvable {
                resolutions.push(self.resolver.resolve(conflict));
            } else {
                self.resolver.record_unresolved(conflict);
            }
        }

        resolutions
    }

    async fn persist_resolutions(&self, resolutions: &[ResolutionRecord]) {
        if resolutions.is_empty() {
            return;
        }
        let Some(pool) = &self.pool else {
            return;
        };

        let recent: Vec<Conflict> = self.resolver.recent(PERSISTED_RESOLUTIONS);
        if let Err(e) = pool.set("conflict_log", &recent, Namespace::Sync, None).await {
            warn!(error = %e, "failed to persist conflict log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mk_product(id: u64, price: f64, stock: i64) -> Product {
        Product {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Termék {id}"),
            description: None,
            category_id: 1,
            price,
            stock,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn divergent_product_yields_price_and_stock_resolutions() {
        let resolver = Arc::new(ConflictResolver::new());
        let monitor = ConflictMonitor::new(resolver.clone(), None, None);

        let local = vec![mk_product(1, 100.0, 50)];
        let remote = vec![mk_product(1, 110.0, 30)];

        let report = monitor.scan(&local, &remote).await;

        assert_eq!(report.conflicts_detected, 2);
        assert_eq!(report.conflicts_resolved, 2);
        assert!(!report.alert_triggered);

        let price = report
            .resolutions
            .iter()
            .find(|r| r.conflict_type == super::super::types::ConflictType::PriceConflict)
            .unwrap();
        assert_eq!(price.resolution_data["price"], 110.0);

        let stock = report
            .resolutions
            .iter()
            .find(|r| r.conflict_type == super::super::types::ConflictType::StockConflict)
            .unwrap();
        assert_eq!(stock.resolution_data["stock"], 50);

        assert!((resolver.stats().resolution_rate - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn identical_lists_are_conflict_free() {
        let monitor = ConflictMonitor::new(Arc::new(ConflictResolver::new()), None, None);
        let products = vec![mk_product(1, 100.0, 10), mk_product(2, 200.0, 5)];

        let report = monitor.scan(&products, &products).await;
        assert_eq!(report.conflicts_detected, 0);
        assert!(report.resolutions.is_empty());
    }

    #[tokio::test]
    async fn integrity_conflicts_go_to_manual_review() {
        let resolver = Arc::new(ConflictResolver::new());
        let monitor = ConflictMonitor::new(resolver.clone(), None, None);

        let bad = vec![mk_product(1, -10.0, 5)];
        let report = monitor.scan(&bad, &bad).await;

        // Same record on both sides: two integrity hits, none auto-resolved.
        assert_eq!(report.conflicts_detected, 2);
        assert_eq!(report.conflicts_resolved, 0);

        let stats = resolver.stats();
        assert_eq!(stats.unresolved, 2);
    }

    #[tokio::test]
    async fn alert_fires_at_threshold_and_publishes() {
        let resolver = Arc::new(ConflictResolver::new());
        let bus = EventBus::with_capacity(16);
        let monitor =
            ConflictMonitor::new(resolver, Some(bus.clone()), None).with_alert_threshold(2);

        let local = vec![mk_product(1, 100.0, 50)];
        let remote = vec![mk_product(1, 120.0, 10)];

        let report = monitor.scan(&local, &remote).await;
        assert!(report.alert_triggered);

        // Bus not started: the alert event is sitting in the queue.
        assert_eq!(bus.queue_depth(), 1);
    }
}
