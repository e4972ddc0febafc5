//! Shared types for the background job subsystem.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag identifying a scheduled background task variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ProductSync,
    InventorySync,
    PriceSync,
    OrderSync,
    FullSync,
    AbandonedCartDetect,
    Cleanup,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ProductSync => "product_sync",
            JobKind::InventorySync => "inventory_sync",
            JobKind::PriceSync => "price_sync",
            JobKind::OrderSync => "order_sync",
            JobKind::FullSync => "full_sync",
            JobKind::AbandonedCartDetect => "abandoned_cart_detect",
            JobKind::Cleanup => "cleanup",
        }
    }

    /// The four component syncs a FullSync is composed of.
    pub const FULL_SYNC_COMPONENTS: [JobKind; 4] = [
        JobKind::ProductSync,
        JobKind::InventorySync,
        JobKind::PriceSync,
        JobKind::OrderSync,
    ];
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one registered job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub kind: JobKind,
    pub interval: Duration,
    pub enabled: bool,
    /// Extra attempts after the first failure.
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Per-run deadline; expiry counts as a failed attempt.
    pub max_execution_time: Duration,
}

impl JobConfig {
    pub fn new(kind: JobKind, interval: Duration) -> Self {
        Self {
            kind,
            interval,
            enabled: true,
            retry_count: 3,
            retry_delay: Duration::from_secs(60),
            max_execution_time: Duration::from_secs(300),
        }
    }

    pub fn job_id(&self) -> String {
        format!("{}_{}min", self.kind, self.interval.as_secs() / 60)
    }

    /// The standing job set registered at startup.
    pub fn default_jobs() -> Vec<JobConfig> {
        vec![
            JobConfig::new(JobKind::ProductSync, Duration::from_secs(60 * 60)),
            JobConfig::new(JobKind::InventorySync, Duration::from_secs(15 * 60)),
            JobConfig::new(JobKind::PriceSync, Duration::from_secs(30 * 60)),
            JobConfig::new(JobKind::OrderSync, Duration::from_secs(10 * 60)),
            JobConfig::new(JobKind::FullSync, Duration::from_secs(24 * 60 * 60)),
            JobConfig::new(JobKind::AbandonedCartDetect, Duration::from_secs(15 * 60)),
            JobConfig::new(JobKind::Cleanup, Duration::from_secs(24 * 60 * 60)),
        ]
    }
}

/// One completed run, retries included. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: Uuid,
    pub job_id: String,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// 1 + retries used.
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Executes the actual work behind a job kind (webshop sync, cart
/// detection, cleanup). Implemented by the composition root; mocked in
/// tests. FullSync is never passed here — the scheduler decomposes it.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, kind: JobKind) -> anyhow::Result<serde_json::Value>;
}
