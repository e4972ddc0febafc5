use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    PriceConflict,
    StockConflict,
    DuplicateProduct,
    CategoryMismatch,
    DataIntegrity,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::PriceConflict => "price_conflict",
            ConflictType::StockConflict => "stock_conflict",
            ConflictType::DuplicateProduct => "duplicate_product",
            ConflictType::CategoryMismatch => "category_mismatch",
            ConflictType::DataIntegrity => "data_integrity",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepRemote,
    Merge,
    AutoResolve,
    ManualReview,
}

/// A detected divergence between the local and remote view of the same
/// entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub local_snapshot: serde_json::Value,
    pub remote_snapshot: serde_json::Value,
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
    pub description: String,
    pub resolution_strategy: Option<ResolutionStrategy>,
}

impl Conflict {
    pub fn new(
        conflict_type: ConflictType,
        local_snapshot: serde_json::Value,
        remote_snapshot: serde_json::Value,
        severity: Severity,
        description: String,
    ) -> Self {
        Self {
            conflict_type,
            local_snapshot,
            remote_snapshot,
            detected_at: Utc::now(),
            severity,
            description,
            resolution_strategy: None,
        }
    }
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub conflict_type: ConflictType,
    pub strategy: ResolutionStrategy,
    pub resolution_data: serde_json::Value,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictStats {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub by_type: HashMap<String, usize>,
    /// Percentage of history entries carrying a resolution.
    pub resolution_rate: f64,
}
