//! Conflict detection and resolution.
//!
//! Detectors are pure functions over product records; the resolver owns
//! the strategy table and a bounded history ring from which statistics
//! are derived.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use common::models::Product;

use super::types::{
    Conflict, ConflictStats, ConflictType, ResolutionRecord, ResolutionStrategy, Severity,
};

/// History ring bound. Stats derive from the live ring only.
const HISTORY_CAP: usize = 10_000;

/// Price divergence below one cent is noise, not a conflict.
const PRICE_TOLERANCE: f64 = 0.01;
/// Stock divergence tolerated before flagging (picking/packing lag).
const STOCK_TOLERANCE: i64 = 5;

// Float guard so a difference of exactly the tolerance never flags.
const EPSILON: f64 = 1e-9;

pub fn detect_price_conflict(local: &Product, remote: &Product) -> Option<Conflict> {
    let diff = (local.price - remote.price).abs();
    if diff - PRICE_TOLERANCE > EPSILON {
        Some(Conflict::new(
            ConflictType::PriceConflict,
            serde_json::json!({ "price": local.price, "updated_at": local.updated_at }),
            serde_json::json!({ "price": remote.price, "updated_at": remote.updated_at }),
            Severity::High,
            format!(
                "price divergence on product {}: local {} vs remote {}",
                local.id, local.price, remote.price
            ),
        ))
    } else {
        None
    }
}

pub fn detect_stock_conflict(local: &Product, remote: &Product) -> Option<Conflict> {
    let diff = (local.stock - remote.stock).abs();
    if diff > STOCK_TOLERANCE {
        Some(Conflict::new(
            ConflictType::StockConflict,
            serde_json::json!({ "stock": local.stock, "updated_at": local.updated_at }),
            serde_json::json!({ "stock": remote.stock, "updated_at": remote.updated_at }),
            Severity::Medium,
            format!(
                "stock divergence on product {}: local {} vs remote {}",
                local.id, local.stock, remote.stock
            ),
        ))
    } else {
        None
    }
}

/// Same SKU appearing under distinct product ids.
pub fn detect_duplicate_products(products: &[Product]) -> Vec<Conflict> {
    let mut seen: HashMap<&str, &Product> = HashMap::new();
    let mut conflicts = Vec::new();

    for product in products {
        match seen.get(product.sku.as_str()) {
            Some(first) if first.id != product.id => {
                conflicts.push(Conflict::new(
                    ConflictType::DuplicateProduct,
                    serde_json::json!({ "sku": product.sku, "id": product.id }),
                    serde_json::json!({ "sku": first.sku, "id": first.id }),
                    Severity::Medium,
                    format!("duplicate sku {} on ids {} and {}", product.sku, product.id, first.id),
                ));
            }
            Some(_) => {}
            None => {
                seen.insert(product.sku.as_str(), product);
            }
        }
    }

    conflicts
}

pub fn detect_category_mismatch(local: &Product, remote: &Product) -> Option<Conflict> {
    if local.category_id != remote.category_id {
        Some(Conflict::new(
            ConflictType::CategoryMismatch,
            serde_json::json!({ "category_id": local.category_id }),
            serde_json::json!({ "category_id": remote.category_id }),
            Severity::Low,
            format!(
                "category divergence on product {}: local {} vs remote {}",
                local.id, local.category_id, remote.category_id
            ),
        ))
    } else {
        None
    }
}

/// Internal consistency checks on a single record.
pub fn detect_data_integrity_issues(product: &Product) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    if product.price <= 0.0 {
        conflicts.push(Conflict::new(
            ConflictType::DataIntegrity,
            serde_json::json!({ "id": product.id, "price": product.price }),
            serde_json::Value::Null,
            Severity::High,
            format!("invalid price {} on product {}", product.price, product.id),
        ));
    }

    if product.stock < 0 {
        conflicts.push(Conflict::new(
            ConflictType::DataIntegrity,
            serde_json::json!({ "id": product.id, "stock": product.stock }),
            serde_json::Value::Null,
            Severity::Medium,
            format!("negative stock {} on product {}", product.stock, product.id),
        ));
    }

    if product.name.trim().len() < 2 {
        conflicts.push(Conflict::new(
            ConflictType::DataIntegrity,
            serde_json::json!({ "id": product.id, "name": product.name }),
            serde_json::Value::Null,
            Severity::High,
            format!("missing or too-short name on product {}", product.id),
        ));
    }

    conflicts
}

pub struct ConflictResolver {
    rules: Mutex<HashMap<ConflictType, ResolutionStrategy>>,
    history: Mutex<VecDeque<Conflict>>,
    auto_resolve_enabled: AtomicBool,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictResolver {
    pub fn new() -> Self {
        let rules = HashMap::from([
            (ConflictType::PriceConflict, ResolutionStrategy::KeepRemote),
            (ConflictType::StockConflict, ResolutionStrategy::Merge),
            (ConflictType::DuplicateProduct, ResolutionStrategy::AutoResolve),
            (ConflictType::CategoryMismatch, ResolutionStrategy::KeepRemote),
            (ConflictType::DataIntegrity, ResolutionStrategy::ManualReview),
        ]);

        Self {
            rules: Mutex::new(rules),
            history: Mutex::new(VecDeque::new()),
            auto_resolve_enabled: AtomicBool::new(true),
        }
    }

    pub fn rule_for(&self, conflict_type: ConflictType) -> ResolutionStrategy {
        self.rules
            .lock()
            .get(&conflict_type)
            .copied()
            .unwrap_or(ResolutionStrategy::ManualReview)
    }

    pub fn set_rule(&self, conflict_type: ConflictType, strategy: ResolutionStrategy) {
        info!(
            conflict_type = conflict_type.as_str(),
            strategy = ?strategy,
            "resolution rule updated"
        );
        self.rules.lock().insert(conflict_type, strategy);
    }

    pub fn auto_resolve_enabled(&self) -> bool {
        self.auto_resolve_enabled.load(Ordering::Relaxed)
    }

    pub fn set_auto_resolve(&self, enabled: bool) {
        self.auto_resolve_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Resolve one conflict with its configured (or overriding)
    /// strategy and append it to the history.
    pub fn resolve(&self, mut conflict: Conflict) -> ResolutionRecord {
        let strategy = conflict
            .resolution_strategy
            .unwrap_or_else(|| self.rule_for(conflict.conflict_type));

        let resolution_data = match strategy {
            ResolutionStrategy::KeepLocal => conflict.local_snapshot.clone(),
            ResolutionStrategy::KeepRemote => conflict.remote_snapshot.clone(),
            ResolutionStrategy::Merge => merge_snapshots(&conflict),
            ResolutionStrategy::AutoResolve => auto_resolve(&conflict),
            ResolutionStrategy::ManualReview => {
                warn!(
                    conflict_type = conflict.conflict_type.as_str(),
                    "conflict flagged for manual review"
                );
                serde_json::json!({ "requires_manual_review": true })
            }
        };

        conflict.resolution_strategy = Some(strategy);
        let conflict_type = conflict.conflict_type;
        self.push_history(conflict);

        ResolutionRecord {
            conflict_type,
            strategy,
            resolution_data,
            resolved_at: chrono::Utc::now(),
        }
    }

    /// Record a conflict that was deliberately left unresolved (manual
    /// review with auto-resolution off).
    pub fn record_unresolved(&self, conflict: Conflict) {
        self.push_history(conflict);
    }

    fn push_history(&self, conflict: Conflict) {
        let mut history = self.history.lock();
        if history.len() >= HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(conflict);
    }

    pub fn recent(&self, limit: usize) -> Vec<Conflict> {
        let history = self.history.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> ConflictStats {
        let history = self.history.lock();
        let total = history.len();
        let resolved = history
            .iter()
            .filter(|c| c.resolution_strategy.is_some())
            .count();

        let mut by_type: HashMap<String, usize> = HashMap::new();
        for conflict in history.iter() {
            *by_type.entry(conflict.conflict_type.as_str().to_string()).or_default() += 1;
        }

        ConflictStats {
            total,
            resolved,
            unresolved: total - resolved,
            by_type,
            resolution_rate: if total > 0 {
                resolved as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Merge semantics per conflict type. Stock takes the larger count
/// (never under-promise availability); anything else falls back to the
/// remote view.
fn merge_snapshots(conflict: &Conflict) -> serde_json::Value {
    match conflict.conflict_type {
        ConflictType::StockConflict => {
            let local = conflict.local_snapshot.get("stock").and_then(|v| v.as_i64()).unwrap_or(0);
            let remote = conflict.remote_snapshot.get("stock").and_then(|v| v.as_i64()).unwrap_or(0);
            serde_json::json!({
                "stock": local.max(remote),
                "merged_from": { "local": local, "remote": remote },
            })
        }
        _ => conflict.remote_snapshot.clone(),
    }
}

/// Auto-resolution: duplicate products keep the record with the larger
/// id (the newer one); anything else falls back to the remote view.
fn auto_resolve(conflict: &Conflict) -> serde_json::Value {
    match conflict.conflict_type {
        ConflictType::DuplicateProduct => {
            let local_id = conflict.local_snapshot.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
            let remote_id = conflict.remote_snapshot.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
            let (keep, remove) = if local_id > remote_id {
                (local_id, remote_id)
            } else {
                (remote_id, local_id)
            };
            serde_json::json!({ "keep_id": keep, "remove_id": remove })
        }
        _ => conflict.remote_snapshot.clone(),
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

    #[test]
    fn price_tolerance_boundary() {
        let local = mk_product(1, 100.00, 10);

        // Exactly one cent apart: not a conflict.
        let remote = mk_product(1, 100.01, 10);
        assert!(detect_price_conflict(&local, &remote).is_none());

        // Two cents apart: conflict.
        let remote = mk_product(1, 100.02, 10);
        assert!(detect_price_conflict(&local, &remote).is_some());
    }

    #[test]
    fn stock_tolerance_boundary() {
        let local = mk_product(1, 100.0, 50);

        let remote = mk_product(1, 100.0, 45);
        assert!(detect_stock_conflict(&local, &remote).is_none());

        let remote = mk_product(1, 100.0, 44);
        assert!(detect_stock_conflict(&local, &remote).is_some());
    }

    #[test]
    fn duplicate_detection_requires_distinct_ids() {
        let mut a = mk_product(1, 100.0, 5);
        let mut b = mk_product(2, 120.0, 5);
        b.sku = a.sku.clone();

        let conflicts = detect_duplicate_products(&[a.clone(), b.clone()]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::DuplicateProduct);

        // Same record appearing twice (same id) is not a duplicate.
        b.id = 1;
        a.sku = "SKU-1".into();
        b.sku = "SKU-1".into();
        assert!(detect_duplicate_products(&[a, b]).is_empty());
    }

    #[test]
    fn integrity_checks_flag_bad_records() {
        let mut p = mk_product(1, 0.0, -3);
        p.name = " ".into();

        let conflicts = detect_data_integrity_issues(&p);
        assert_eq!(conflicts.len(), 3);
        assert!(conflicts.iter().all(|c| c.conflict_type == ConflictType::DataIntegrity));
    }

    #[test]
    fn price_conflict_resolves_to_remote() {
        let resolver = ConflictResolver::new();
        let conflict = detect_price_conflict(&mk_product(1, 100.0, 10), &mk_product(1, 110.0, 10))
            .expect("conflict");

        let record = resolver.resolve(conflict);
        assert_eq!(record.strategy, ResolutionStrategy::KeepRemote);
        assert_eq!(record.resolution_data["price"], 110.0);
    }

    #[test]
    fn stock_conflict_merges_to_max() {
        let resolver = ConflictResolver::new();
        let conflict = detect_stock_conflict(&mk_product(1, 100.0, 50), &mk_product(1, 100.0, 30))
            .expect("conflict");

        let record = resolver.resolve(conflict);
        assert_eq!(record.strategy, ResolutionStrategy::Merge);
        assert_eq!(record.resolution_data["stock"], 50);
    }

    #[test]
    fn duplicate_keeps_larger_id() {
        let resolver = ConflictResolver::new();
        let mut newer = mk_product(7, 100.0, 1);
        let mut older = mk_product(3, 100.0, 1);
        newer.sku = "S".into();
        older.sku = "S".into();

        let conflicts = detect_duplicate_products(&[older, newer]);
        let record = resolver.resolve(conflicts.into_iter().next().unwrap());
        assert_eq!(record.resolution_data["keep_id"], 7);
        assert_eq!(record.resolution_data["remove_id"], 3);
    }

    #[test]
    fn explicit_strategy_overrides_rule() {
        let resolver = ConflictResolver::new();
        let mut conflict =
            detect_price_conflict(&mk_product(1, 100.0, 10), &mk_product(1, 110.0, 10)).unwrap();
        conflict.resolution_strategy = Some(ResolutionStrategy::KeepLocal);

        let record = resolver.resolve(conflict);
        assert_eq!(record.strategy, ResolutionStrategy::KeepLocal);
        assert_eq!(record.resolution_data["price"], 100.0);
    }

    #[test]
    fn stats_derive_from_the_ring() {
        let resolver = ConflictResolver::new();

        let c1 = detect_price_conflict(&mk_product(1, 100.0, 10), &mk_product(1, 110.0, 10)).unwrap();
        resolver.resolve(c1);

        let c2 = detect_data_integrity_issues(&mk_product(2, -5.0, 1)).remove(0);
        resolver.record_unresolved(c2);

        let stats = resolver.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.by_type["price_conflict"], 1);
        assert!((stats.resolution_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded_fifo() {
        let resolver = ConflictResolver::new();
        for i in 0..(HISTORY_CAP + 10) {
            let c = detect_price_conflict(
                &mk_product(i as u64, 100.0, 10),
                &mk_product(i as u64, 110.0, 10),
            )
            .unwrap();
            resolver.resolve(c);
        }
        assert_eq!(resolver.stats().total, HISTORY_CAP);
    }
}
