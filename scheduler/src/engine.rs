//! The background job scheduler.
//!
//! Responsibilities:
//! - Register job configs at startup and launch one loop per enabled job.
//! - Run each job under its deadline, retrying per its config.
//! - Keep a bounded run history (with best-effort persistence through
//!   the cache) and publish domain events for successful runs.
//!
//! Scheduling is monotonic: the interval is measured from run start,
//! and when a run overruns its interval the missed tick is dropped
//! rather than accumulating a backlog. Runs of one job are strictly
//! sequential; distinct jobs are independent tasks.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use cache::{CachePool, Namespace};

use crate::bus::{Event, EventBus, EventType};
use crate::types::{JobConfig, JobExecutor, JobKind, JobRun};

/// Bounded ring of recent runs.
const HISTORY_CAP: usize = 1000;
/// Slice of history persisted through the cache after each run.
const PERSISTED_RUNS: usize = 50;

const EVENT_SOURCE: &str = "sync_scheduler";

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub running_jobs: Vec<String>,
    pub total_jobs: usize,
    pub enabled_jobs: usize,
    pub history_len: usize,
    pub last_runs: Vec<JobRun>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatistics {
    pub total_runs: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_execution_ms: f64,
}

pub struct SyncScheduler {
    executor: Arc<dyn JobExecutor>,
    bus: Arc<EventBus>,
    pool: Option<Arc<CachePool>>,
    jobs: Mutex<HashMap<String, JobConfig>>,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
    history: Mutex<VecDeque<JobRun>>,
}

impl SyncScheduler {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        bus: Arc<EventBus>,
        pool: Option<Arc<CachePool>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            executor,
            bus,
            pool,
            jobs: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        })
    }

    /// Register the standing job set (§ sync cadences) on top of `new`.
    pub fn with_default_jobs(
        executor: Arc<dyn JobExecutor>,
        bus: Arc<EventBus>,
        pool: Option<Arc<CachePool>>,
    ) -> Arc<Self> {
        let scheduler = Self::new(executor, bus, pool);
        for config in JobConfig::default_jobs() {
            scheduler.add_job(config);
        }
        scheduler
    }

    pub fn add_job(&self, config: JobConfig) {
        let job_id = config.job_id();
        info!(job_id = %job_id, enabled = config.enabled, "job registered");
        self.jobs.lock().insert(job_id, config);
    }

    pub fn remove_job(&self, job_id: &str) {
        if self.jobs.lock().remove(job_id).is_some() {
            info!(job_id, "job removed");
        }
        if let Some(handle) = self.running.lock().remove(job_id) {
            handle.abort();
        }
    }

    /// Launch one loop per enabled job. Jobs already running are left
    /// alone.
    pub fn start_all(self: &Arc<Self>) {
        let jobs: Vec<(String, JobConfig)> = self
            .jobs
            .lock()
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(id, c)| (id.clone(), c.clone()))
            .collect();

        let mut running = self.running.lock();
        for (job_id, config) in jobs {
            if running.contains_key(&job_id) {
                warn!(job_id = %job_id, "job already running");
                continue;
            }

            let scheduler = Arc::clone(self);
            let id = job_id.clone();
            let handle = tokio::spawn(async move {
                scheduler.run_loop(id, config).await;
            });
            running.insert(job_id, handle);
        }
    }

    /// Cancel every job loop. In-flight runs are aborted; the caller is
    /// expected to have drained anything that must complete.
    pub fn stop_all(&self) {
        let mut running = self.running.lock();
        for (job_id, handle) in running.drain() {
            debug!(job_id = %job_id, "job loop cancelled");
            handle.abort();
        }
    }

    async fn run_loop(self: Arc<Self>, job_id: String, config: JobConfig) {
        info!(job_id = %job_id, interval_s = config.interval.as_secs(), "job loop started");

        let mut ticker = tokio::time::interval(config.interval);
        // Overruns drop the missed tick instead of building a backlog.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.run_once(&job_id, &config).await;
        }
    }

    /// Execute one run, retries included, and record it. Public so the
    /// admin surface can trigger a job out of schedule.
    #[instrument(skip(self, config), target = "scheduler", fields(kind = %config.kind))]
    pub async fn run_once(&self, job_id: &str, config: &JobConfig) -> JobRun {
        let started_at = Utc::now();
        let mut attempts: u32 = 1;

        let mut outcome = self.execute(config).await;

        if outcome.is_err() {
            for _retry in 0..config.retry_count {
                tokio::time::sleep(config.retry_delay).await;
                attempts += 1;
                outcome = self.execute(config).await;
                if outcome.is_ok() {
                    break;
                }
            }
        }

        let run = match outcome {
            Ok(result) => {
                info!(job_id, attempts, "job run succeeded");
                JobRun {
                    run_id: Uuid::new_v4(),
                    job_id: job_id.to_string(),
                    kind: config.kind,
                    started_at,
                    finished_at: Utc::now(),
                    success: true,
                    attempts,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                error!(job_id, attempts, error = %e, "job run failed after retries");
                JobRun {
                    run_id: Uuid::new_v4(),
                    job_id: job_id.to_string(),
                    kind: config.kind,
                    started_at,
                    finished_at: Utc::now(),
                    success: false,
                    attempts,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };

        self.record_run(&run).await;

        if run.success {
            self.publish_events(&run);
        }

        run
    }

    async fn execute(&self, config: &JobConfig) -> anyhow::Result<serde_json::Value> {
        if config.kind == JobKind::FullSync {
            return Ok(self.execute_full_sync(config).await);
        }
        self.execute_component(config.kind, config).await
    }

    async fn execute_component(
        &self,
        kind: JobKind,
        config: &JobConfig,
    ) -> anyhow::Result<serde_json::Value> {
        match tokio::time::timeout(config.max_execution_time, self.executor.execute(kind)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "job exceeded max execution time of {}s",
                config.max_execution_time.as_secs()
            )),
        }
    }

    /// Composite sync: the four component syncs run sequentially; a
    /// failing component is recorded in the aggregate but does not stop
    /// the others.
    async fn execute_full_sync(&self, config: &JobConfig) -> serde_json::Value {
        let mut results = serde_json::Map::new();

        for kind in JobKind::FULL_SYNC_COMPONENTS {
            match self.execute_component(kind, config).await {
                Ok(result) => {
                    results.insert(kind.as_str().to_string(), result);
                }
                Err(e) => {
                    warn!(component = kind.as_str(), error = %e, "full sync component failed");
                    results.insert(
                        kind.as_str().to_string(),
                        serde_json::json!({ "error": e.to_string() }),
                    );
                }
            }
        }

        serde_json::json!({
            "full_sync_completed": true,
            "results": results,
        })
    }

    async fn record_run(&self, run: &JobRun) {
        let recent: Vec<JobRun> = {
            let mut history = self.history.lock();
            if history.len() >= HISTORY_CAP {
                history.pop_front();
            }
            history.push_back(run.clone());
            history.iter().rev().take(PERSISTED_RUNS).cloned().collect()
        };

        // Restart-survivable history is best-effort: a cache outage must
        // never fail the job itself.
        if let Some(pool) = &self.pool {
            let key = format!("job_history:{}", run.kind);
            if let Err(e) = pool.set(&key, &recent, Namespace::Sync, None).await {
                warn!(error = %e, "failed to persist job history");
            }
        }
    }

    fn publish_events(&self, run: &JobRun) {
        match run.kind {
            JobKind::FullSync => {
                // Surface the component syncs that actually succeeded.
                let results = run
                    .result
                    .as_ref()
                    .and_then(|r| r.get("results"))
                    .cloned()
                    .unwrap_or_default();

                for kind in JobKind::FULL_SYNC_COMPONENTS {
                    let component = results.get(kind.as_str()).cloned();
                    let failed = component
                        .as_ref()
                        .is_none_or(|c| c.get("error").is_some());
                    if failed {
                        continue;
                    }
                    if let Some(event_type) = component_event(kind) {
                        self.bus.publish(Event::new(
                            event_type,
                            serde_json::json!({ "job_id": run.job_id, "result": component }),
                            EVENT_SOURCE,
                        ));
                    }
                }
            }
            JobKind::AbandonedCartDetect => {
                let detected = run
                    .result
                    .as_ref()
                    .and_then(|r| r.get("detected"))
                    .and_then(|d| d.as_u64())
                    .unwrap_or(0);
                if detected > 0 {
                    self.bus.publish(Event::new(
                        EventType::CartAbandoned,
                        serde_json::json!({ "job_id": run.job_id, "detected": detected }),
                        EVENT_SOURCE,
                    ));
                }
            }
            JobKind::Cleanup => {}
            kind => {
                if let Some(event_type) = component_event(kind) {
                    self.bus.publish(Event::new(
                        event_type,
                        serde_json::json!({ "job_id": run.job_id, "result": run.result }),
                        EVENT_SOURCE,
                    ));
                }
            }
        }
    }

    pub fn history(&self) -> Vec<JobRun> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn job_status(&self) -> JobStatus {
        let jobs = self.jobs.lock();
        let history = self.history.lock();

        JobStatus {
            running_jobs: self.running.lock().keys().cloned().collect(),
            total_jobs: jobs.len(),
            enabled_jobs: jobs.values().filter(|c| c.enabled).count(),
            history_len: history.len(),
            last_runs: history.iter().rev().take(5).cloned().collect(),
        }
    }

    pub fn job_statistics(&self) -> JobStatistics {
        let history = self.history.lock();
        let total = history.len();
        if total == 0 {
            return JobStatistics {
                total_runs: 0,
                successful: 0,
                failed: 0,
                success_rate: 0.0,
                avg_execution_ms: 0.0,
            };
        }

        let successful = history.iter().filter(|r| r.success).count();
        let total_ms: i64 = history
            .iter()
            .map(|r| (r.finished_at - r.started_at).num_milliseconds().max(0))
            .sum();

        JobStatistics {
            total_runs: total,
            successful,
            failed: total - successful,
            success_rate: successful as f64 / total as f64 * 100.0,
            avg_execution_ms: total_ms as f64 / total as f64,
        }
    }
}

fn component_event(kind: JobKind) -> Option<EventType> {
    match kind {
        JobKind::ProductSync => Some(EventType::ProductUpdated),
        JobKind::InventorySync => Some(EventType::InventoryChanged),
        JobKind::PriceSync => Some(EventType::PriceChanged),
        JobKind::OrderSync => Some(EventType::OrderCreated),
        _ => None,
    }
}
