use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use scheduler::bus::{Event, EventBus, EventHandler, EventType};
use scheduler::types::{JobConfig, JobExecutor, JobKind};
use scheduler::SyncScheduler;

/// Fails the first `fail_first` executions, then succeeds.
struct FlakyExecutor {
    fail_first: u32,
    calls: AtomicU32,
}

impl FlakyExecutor {
    fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl JobExecutor for FlakyExecutor {
    async fn execute(&self, kind: JobKind) -> anyhow::Result<serde_json::Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_first {
            anyhow::bail!("transient failure on attempt {n}");
        }
        Ok(serde_json::json!({ "kind": kind.as_str(), "attempt": n }))
    }
}

struct Recorder {
    seen: Arc<Mutex<Vec<EventType>>>,
}

#[async_trait::async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.seen.lock().push(event.event_type);
        Ok(())
    }
}

fn subscribe_all(bus: &Arc<EventBus>) -> Arc<Mutex<Vec<EventType>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in [
        EventType::ProductUpdated,
        EventType::InventoryChanged,
        EventType::PriceChanged,
        EventType::OrderCreated,
        EventType::CartAbandoned,
    ] {
        bus.subscribe(event_type, Arc::new(Recorder { seen: seen.clone() }));
    }
    seen
}

async fn settle(bus: &Arc<EventBus>) {
    for _ in 0..100 {
        if bus.queue_depth() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn failed_attempt_retries_and_emits_one_event() {
    let bus = EventBus::new();
    let seen = subscribe_all(&bus);
    bus.start();

    let executor = Arc::new(FlakyExecutor::new(1));
    let scheduler = SyncScheduler::new(executor.clone(), bus.clone(), None);

    let mut config = JobConfig::new(JobKind::ProductSync, Duration::from_millis(100));
    config.retry_count = 2;
    config.retry_delay = Duration::from_millis(10);

    let run = scheduler.run_once(&config.job_id(), &config).await;

    assert!(run.success);
    assert_eq!(run.attempts, 2);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);

    let history = scheduler.history();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);

    settle(&bus).await;
    bus.stop().await;

    let events = seen.lock().clone();
    assert_eq!(events, vec![EventType::ProductUpdated]);
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted_records_failure_and_no_event() {
    let bus = EventBus::new();
    let seen = subscribe_all(&bus);
    bus.start();

    let scheduler = SyncScheduler::new(Arc::new(FlakyExecutor::new(10)), bus.clone(), None);

    let mut config = JobConfig::new(JobKind::OrderSync, Duration::from_millis(100));
    config.retry_count = 2;
    config.retry_delay = Duration::from_millis(10);

    let run = scheduler.run_once(&config.job_id(), &config).await;

    assert!(!run.success);
    assert_eq!(run.attempts, 3);
    assert!(run.error.is_some());

    settle(&bus).await;
    bus.stop().await;
    assert!(seen.lock().is_empty());
}

struct SlowExecutor;

#[async_trait::async_trait]
impl JobExecutor for SlowExecutor {
    async fn execute(&self, _kind: JobKind) -> anyhow::Result<serde_json::Value> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(serde_json::json!({}))
    }
}

#[tokio::test(start_paused = true)]
async fn overlong_run_counts_as_failed_attempt() {
    let bus = EventBus::new();
    let scheduler = SyncScheduler::new(Arc::new(SlowExecutor), bus, None);

    let mut config = JobConfig::new(JobKind::InventorySync, Duration::from_secs(60));
    config.retry_count = 0;
    config.max_execution_time = Duration::from_secs(1);

    let run = scheduler.run_once(&config.job_id(), &config).await;

    assert!(!run.success);
    assert_eq!(run.attempts, 1);
    assert!(run.error.unwrap().contains("max execution time"));
}

/// Fails exactly one named component; everything else succeeds.
struct PartialExecutor {
    failing: JobKind,
}

#[async_trait::async_trait]
impl JobExecutor for PartialExecutor {
    async fn execute(&self, kind: JobKind) -> anyhow::Result<serde_json::Value> {
        if kind == self.failing {
            anyhow::bail!("{} backend down", kind);
        }
        Ok(serde_json::json!({ "synced": 3 }))
    }
}

#[tokio::test(start_paused = true)]
async fn full_sync_aggregates_and_skips_failed_component_events() {
    let bus = EventBus::new();
    let seen = subscribe_all(&bus);
    bus.start();

    let scheduler = SyncScheduler::new(
        Arc::new(PartialExecutor { failing: JobKind::PriceSync }),
        bus.clone(),
        None,
    );

    let mut config = JobConfig::new(JobKind::FullSync, Duration::from_secs(3600));
    config.retry_count = 0;

    let run = scheduler.run_once(&config.job_id(), &config).await;

    // One component failing is recorded but does not fail the composite.
    assert!(run.success);
    let results = &run.result.as_ref().unwrap()["results"];
    assert!(results["product_sync"]["synced"].is_number());
    assert!(results["price_sync"]["error"].is_string());

    settle(&bus).await;
    bus.stop().await;

    let events = seen.lock().clone();
    assert_eq!(events.len(), 3);
    assert!(events.contains(&EventType::ProductUpdated));
    assert!(events.contains(&EventType::InventoryChanged));
    assert!(events.contains(&EventType::OrderCreated));
    assert!(!events.contains(&EventType::PriceChanged));
}

#[tokio::test(start_paused = true)]
async fn started_loop_ticks_on_its_interval() {
    let bus = EventBus::new();
    let executor = Arc::new(FlakyExecutor::new(0));
    let scheduler = SyncScheduler::new(executor.clone(), bus, None);

    scheduler.add_job(JobConfig::new(JobKind::ProductSync, Duration::from_millis(100)));
    scheduler.start_all();

    // First run fires immediately; the next at +100ms of virtual time.
    for _ in 0..200 {
        if scheduler.history().len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.stop_all();

    assert!(scheduler.history().len() >= 3);

    let status = scheduler.job_status();
    assert_eq!(status.total_jobs, 1);
    assert_eq!(status.enabled_jobs, 1);

    let stats = scheduler.job_statistics();
    assert_eq!(stats.failed, 0);
    assert!((stats.success_rate - 100.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn disabled_jobs_are_not_started() {
    let bus = EventBus::new();
    let executor = Arc::new(FlakyExecutor::new(0));
    let scheduler = SyncScheduler::new(executor.clone(), bus, None);

    let mut config = JobConfig::new(JobKind::Cleanup, Duration::from_millis(50));
    config.enabled = false;
    scheduler.add_job(config);
    scheduler.start_all();

    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop_all();

    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    assert!(scheduler.history().is_empty());
}
