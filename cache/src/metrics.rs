use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Smoothing factor for the response-time EMA.
const EMA_ALPHA: f64 = 0.1;

#[derive(Default)]
struct ResponseTime {
    ema_ms: f64,
    samples: u64,
}

/// Operational counters for the cache pool. Cloning shares the counters.
#[derive(Clone)]
pub struct CacheMetrics {
    pub hits: Arc<AtomicU64>,
    pub misses: Arc<AtomicU64>,
    pub sets: Arc<AtomicU64>,
    pub deletes: Arc<AtomicU64>,
    pub errors: Arc<AtomicU64>,
    pub compression_saves: Arc<AtomicU64>,
    pub bytes_saved: Arc<AtomicU64>,

    response_time: Arc<Mutex<ResponseTime>>,
    last_reset: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            hits: Arc::default(),
            misses: Arc::default(),
            sets: Arc::default(),
            deletes: Arc::default(),
            errors: Arc::default(),
            compression_saves: Arc::default(),
            bytes_saved: Arc::default(),
            response_time: Arc::default(),
            last_reset: Arc::new(Mutex::new(Utc::now())),
        }
    }
}

impl CacheMetrics {
    /// Fold one operation latency into the EMA. The first sample seeds
    /// the average directly.
    pub fn observe_response_time(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut rt = self.response_time.lock();
        if rt.samples == 0 {
            rt.ema_ms = ms;
        } else {
            rt.ema_ms = EMA_ALPHA * ms + (1.0 - EMA_ALPHA) * rt.ema_ms;
        }
        rt.samples += 1;
    }

    pub fn record_compression(&self, original: usize, stored: usize) {
        self.compression_saves.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved
            .fetch_add(original.saturating_sub(stored) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let sets = self.sets.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let rt = self.response_time.lock();

        MetricsSnapshot {
            hits,
            misses,
            sets,
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            compression_saves: self.compression_saves.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
            compression_rate: if sets > 0 {
                self.compression_saves.load(Ordering::Relaxed) as f64 / sets as f64 * 100.0
            } else {
                0.0
            },
            avg_response_time_ms: rt.ema_ms,
            last_reset: *self.last_reset.lock(),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.compression_saves.store(0, Ordering::Relaxed);
        self.bytes_saved.store(0, Ordering::Relaxed);
        *self.response_time.lock() = ResponseTime::default();
        *self.last_reset.lock() = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub compression_saves: u64,
    pub bytes_saved: u64,
    pub hit_rate: f64,
    pub compression_rate: f64,
    pub avg_response_time_ms: f64,
    pub last_reset: DateTime<Utc>,
}
