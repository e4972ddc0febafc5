use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webshop product record as seen by the sync jobs and the conflict
/// resolver. `stock` is signed so that corrupt negative counts coming
/// from a remote feed survive deserialization and can be flagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: u32,
    pub price: f64,
    pub stock: i64,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}
