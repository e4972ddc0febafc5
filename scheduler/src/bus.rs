//! Realtime event bus.
//!
//! Single-consumer queue with typed subscribers. Publishing never
//! blocks: when the queue is at capacity the oldest event is dropped
//! and counted. The consumer delivers events to handlers sequentially
//! in registration order, so per-event-type ordering is preserved; a
//! failing handler is logged and the next event processed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_CAPACITY: usize = 1024;

/// Tag identifying a realtime domain event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProductUpdated,
    InventoryChanged,
    PriceChanged,
    OrderCreated,
    CartAbandoned,
    ConflictDetected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProductUpdated => "product_updated",
            EventType::InventoryChanged => "inventory_changed",
            EventType::PriceChanged => "price_changed",
            EventType::OrderCreated => "order_created",
            EventType::CartAbandoned => "cart_abandoned",
            EventType::ConflictDetected => "conflict_detected",
        }
    }
}

/// One realtime event. Subscribers receive shared snapshots; events are
/// not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub source: String,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value, source: &str) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            payload,
            source: source.to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

pub struct EventBus {
    queue: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
    handlers: Mutex<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    dropped: AtomicU64,
    running: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            notify: Notify::new(),
            handlers: Mutex::new(HashMap::new()),
            dropped: AtomicU64::new(0),
            running: AtomicBool::new(false),
            consumer: Mutex::new(None),
        })
    }

    /// Register a handler for an event type. Multiple handlers per type
    /// are invoked in registration order.
    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.handlers.lock().entry(event_type).or_default().push(handler);
    }

    /// Enqueue an event. Never blocks; at capacity the oldest queued
    /// event is dropped and counted.
    pub fn publish(&self, event: Event) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(capacity = self.capacity, "event queue full; dropped oldest event");
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Spawn the single consumer task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!("event bus consumer started");
            loop {
                if !bus.running.load(Ordering::Acquire) {
                    break;
                }

                let next = bus.queue.lock().pop_front();
                match next {
                    Some(event) => bus.deliver(event).await,
                    None => bus.notify.notified().await,
                }
            }
            debug!("event bus consumer exited");
        });

        *self.consumer.lock() = Some(handle);
    }

    /// Stop the consumer. The in-flight handler finishes; events still
    /// queued are discarded.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.notify.notify_one();

        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let discarded = {
            let mut queue = self.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if discarded > 0 {
            info!(discarded, "event bus stopped; queued events discarded");
        }
    }

    async fn deliver(&self, event: Event) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .lock()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            // One bad handler must not starve the rest of the bus.
            let run = std::panic::AssertUnwindSafe(handler.handle(&event)).catch_unwind();
            match run.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "event handler failed; continuing"
                ),
                Err(_) => warn!(
                    event_type = event.event_type.as_str(),
                    "event handler panicked; continuing"
                ),
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    #[async_trait::async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &Event) -> anyhow::Result<()> {
            self.seen
                .lock()
                .push((self.label.to_string(), event.payload.clone()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("handler exploded"))
        }
    }

    async fn settle(bus: &Arc<EventBus>) {
        // Wait for the consumer to drain; virtual time advances if paused.
        for _ in 0..100 {
            if bus.queue_depth() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            EventType::ProductUpdated,
            Arc::new(Recorder { label: "a", seen: seen.clone() }),
        );

        bus.start();
        for i in 0..5 {
            bus.publish(Event::new(
                EventType::ProductUpdated,
                serde_json::json!({ "seq": i }),
                "test",
            ));
        }

        settle(&bus).await;
        bus.stop().await;

        let events = seen.lock().clone();
        assert_eq!(events.len(), 5);
        for (i, (_, payload)) in events.iter().enumerate() {
            assert_eq!(payload["seq"], i);
        }
    }

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            EventType::OrderCreated,
            Arc::new(Recorder { label: "first", seen: seen.clone() }),
        );
        bus.subscribe(
            EventType::OrderCreated,
            Arc::new(Recorder { label: "second", seen: seen.clone() }),
        );

        bus.start();
        bus.publish(Event::new(EventType::OrderCreated, serde_json::json!({}), "test"));
        settle(&bus).await;
        bus.stop().await;

        let labels: Vec<String> = seen.lock().iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(labels, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_later_events() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventType::PriceChanged, Arc::new(Failing));
        bus.subscribe(
            EventType::PriceChanged,
            Arc::new(Recorder { label: "ok", seen: seen.clone() }),
        );

        bus.start();
        bus.publish(Event::new(EventType::PriceChanged, serde_json::json!({"n": 1}), "test"));
        bus.publish(Event::new(EventType::PriceChanged, serde_json::json!({"n": 2}), "test"));
        settle(&bus).await;
        bus.stop().await;

        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let bus = EventBus::with_capacity(3);
        // Not started: everything stays queued.
        for i in 0..5 {
            bus.publish(Event::new(
                EventType::InventoryChanged,
                serde_json::json!({ "seq": i }),
                "test",
            ));
        }

        assert_eq!(bus.queue_depth(), 3);
        assert_eq!(bus.dropped_events(), 2);

        let head = bus.queue.lock().front().cloned().unwrap();
        assert_eq!(head.payload["seq"], 2);
    }

    #[tokio::test]
    async fn stop_discards_queued_events() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            EventType::CartAbandoned,
            Arc::new(Recorder { label: "late", seen: seen.clone() }),
        );

        // Publish before start, then stop without ever starting delivery.
        bus.publish(Event::new(EventType::CartAbandoned, serde_json::json!({}), "test"));
        bus.start();
        bus.stop().await;

        assert_eq!(bus.queue_depth(), 0);
    }

    #[tokio::test]
    async fn events_of_unsubscribed_types_are_skipped() {
        let bus = EventBus::new();
        bus.start();
        bus.publish(Event::new(EventType::ConflictDetected, serde_json::json!({}), "test"));
        settle(&bus).await;
        bus.stop().await;
        assert_eq!(bus.queue_depth(), 0);
    }
}
