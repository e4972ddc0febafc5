//! Unified cache pool.
//!
//! Responsibilities:
//! - One transport serves every namespace; keys are prefixed
//!   `chatbuddy:v1:{namespace}:{md5(logical_key)}` with a `:meta` sidecar.
//! - Serialize (JSON or opaque bytes), compress above the threshold,
//!   store payload and metadata under the namespace TTL.
//! - Track hits/misses/sets/errors plus compression savings.
//!
//! Cache misses are `Ok(None)`. Transport failures are returned to the
//! caller, who must degrade to recomputing; nothing here retries beyond
//! the transport's own single reconnect.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use common::logger::warn_if_slow;

use crate::codec::{self, EntryMetadata, PayloadKind};
use crate::config::CacheConfig;
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::namespace::Namespace;
use crate::transport::{CacheTransport, MemoryTransport, RedisTransport};

const KEY_PREFIX: &str = "chatbuddy";
const KEY_VERSION: &str = "v1";

/// Transport round trips past this are worth a performance warning.
const SLOW_TRANSPORT_OP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub ping_ms: f64,
    pub metrics: MetricsSnapshot,
}

pub struct CachePool {
    transport: Arc<dyn CacheTransport>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CachePool {
    pub fn new(transport: Arc<dyn CacheTransport>, config: CacheConfig) -> Self {
        Self {
            transport,
            config,
            metrics: CacheMetrics::default(),
        }
    }

    /// Connect to the configured redis endpoint.
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        let transport = RedisTransport::connect(&config).await?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Fully in-memory pool for TESTING mode. Same semantics, including
    /// compression accounting.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryTransport::new()), config)
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn data_key(&self, namespace: Namespace, key: &str) -> String {
        format!(
            "{}:{}:{}:{:x}",
            KEY_PREFIX,
            KEY_VERSION,
            namespace.as_str(),
            md5::compute(key.as_bytes())
        )
    }

    fn meta_key(data_key: &str) -> String {
        format!("{data_key}:meta")
    }

    fn effective_ttl(namespace: Namespace, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or_else(|| namespace.default_ttl())
    }

    /// Store a serde-serializable value as JSON.
    #[instrument(skip(self, value), target = "cache", fields(namespace = %namespace))]
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        namespace: Namespace,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_vec(value).context("cache value serialization failed")?;
        self.set_encoded(key, raw, PayloadKind::Json, namespace, ttl)
            .await
    }

    /// Store opaque bytes (complex objects the JSON path cannot carry).
    pub async fn set_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        namespace: Namespace,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.set_encoded(key, bytes, PayloadKind::Binary, namespace, ttl)
            .await
    }

    async fn set_encoded(
        &self,
        key: &str,
        raw: Vec<u8>,
        kind: PayloadKind,
        namespace: Namespace,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let start = Instant::now();

        let encoded = codec::encode(
            raw,
            kind,
            self.config.compression_threshold,
            self.config.compression_level,
        )?;
        let meta_bytes =
            serde_json::to_vec(&encoded.metadata).context("metadata serialization failed")?;

        if encoded.metadata.compressed {
            self.metrics
                .record_compression(encoded.metadata.size_original, encoded.metadata.size_stored);
        }

        let data_key = self.data_key(namespace, key);
        let meta_key = Self::meta_key(&data_key);
        let ttl = Self::effective_ttl(namespace, ttl);

        let result = warn_if_slow(
            "cache_set",
            SLOW_TRANSPORT_OP,
            self.transport
                .set_pair(&data_key, &encoded.payload, &meta_key, &meta_bytes, ttl),
        )
        .await;

        match result {
            Ok(()) => {
                self.metrics.sets.fetch_add(1, Ordering::Relaxed);
                self.metrics.observe_response_time(start.elapsed());
                Ok(())
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                Err(e).context("cache set failed")
            }
        }
    }

    /// Read and deserialize a JSON value. Missing key is `Ok(None)`.
    #[instrument(skip(self), target = "cache", fields(namespace = %namespace))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: Namespace,
    ) -> Result<Option<T>> {
        match self.get_raw(key, namespace).await? {
            Some(raw) => {
                let value =
                    serde_json::from_slice(&raw).context("cache value deserialization failed")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn get_bytes(&self, key: &str, namespace: Namespace) -> Result<Option<Vec<u8>>> {
        self.get_raw(key, namespace).await
    }

    async fn get_raw(&self, key: &str, namespace: Namespace) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();

        let data_key = self.data_key(namespace, key);
        let meta_key = Self::meta_key(&data_key);

        let pair = match warn_if_slow(
            "cache_get",
            SLOW_TRANSPORT_OP,
            self.transport.get_pair(&data_key, &meta_key),
        )
        .await
        {
            Ok(pair) => pair,
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                return Err(e).context("cache get failed");
            }
        };

        let Some((payload, meta_raw)) = pair else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let metadata: Option<EntryMetadata> = match meta_raw {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    // Tolerate a corrupt sidecar; the payload may still decode raw.
                    debug!(error = %e, "ignoring unreadable cache metadata");
                    None
                }
            },
            None => None,
        };

        let raw = codec::decode(payload, metadata.as_ref())?;

        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        self.metrics.observe_response_time(start.elapsed());
        Ok(Some(raw))
    }

    pub async fn delete(&self, key: &str, namespace: Namespace) -> Result<bool> {
        let data_key = self.data_key(namespace, key);
        let meta_key = Self::meta_key(&data_key);

        match self.transport.delete_pair(&data_key, &meta_key).await {
            Ok(removed) => {
                if removed {
                    self.metrics.deletes.fetch_add(1, Ordering::Relaxed);
                }
                Ok(removed)
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                Err(e).context("cache delete failed")
            }
        }
    }

    pub async fn exists(&self, key: &str, namespace: Namespace) -> Result<bool> {
        let data_key = self.data_key(namespace, key);
        self.transport.exists(&data_key).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration, namespace: Namespace) -> Result<bool> {
        let data_key = self.data_key(namespace, key);
        let meta_key = Self::meta_key(&data_key);
        self.transport.expire_pair(&data_key, &meta_key, ttl).await
    }

    /// Integer increment; counters bypass the codec entirely.
    pub async fn incr(&self, key: &str, amount: i64, namespace: Namespace) -> Result<i64> {
        let data_key = self.data_key(namespace, key);
        self.transport.incr_by(&data_key, amount).await
    }

    pub async fn get_count(&self, key: &str, namespace: Namespace) -> Result<Option<i64>> {
        let data_key = self.data_key(namespace, key);
        self.transport.get_counter(&data_key).await
    }

    /// Transport ping plus a metrics snapshot.
    pub async fn health_check(&self) -> HealthReport {
        let start = Instant::now();
        let status = match self.transport.ping().await {
            Ok(()) => "healthy",
            Err(e) => {
                warn!(error = %e, "cache health check failed");
                "unhealthy"
            }
        };

        HealthReport {
            status,
            ping_ms: start.elapsed().as_secs_f64() * 1000.0,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Periodically log cache statistics. Returns the task handle so the
    /// composition root can cancel it at shutdown.
    pub fn spawn_monitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = pool.config.health_check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let report = pool.health_check().await;
                tracing::info!(
                    target: "cache",
                    status = report.status,
                    ping_ms = report.ping_ms,
                    hit_rate = report.metrics.hit_rate,
                    compression_rate = report.metrics.compression_rate,
                    bytes_saved = report.metrics.bytes_saved,
                    "cache health"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn mk_pool() -> CachePool {
        CachePool::in_memory(CacheConfig::default())
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        tags: Vec<String>,
        score: f64,
    }

    #[tokio::test]
    async fn set_then_get_round_trips_json() {
        let pool = mk_pool();
        let value = Payload {
            name: "iPhone 15".into(),
            tags: vec!["telefon".into(), "apple".into()],
            score: 4.8,
        };

        pool.set("product:1", &value, Namespace::ProductInfo, None)
            .await
            .unwrap();

        let back: Option<Payload> = pool.get("product:1", Namespace::ProductInfo).await.unwrap();
        assert_eq!(back, Some(value));

        let snap = pool.stats();
        assert_eq!(snap.sets, 1);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 0);
    }

    #[tokio::test]
    async fn miss_is_not_an_error() {
        let pool = mk_pool();
        let got: Option<String> = pool.get("absent", Namespace::SearchResult).await.unwrap();
        assert!(got.is_none());
        assert_eq!(pool.stats().misses, 1);
    }

    #[tokio::test]
    async fn large_values_are_compressed_and_accounted() {
        let pool = mk_pool();
        let value = "a".repeat(4096);

        pool.set("big", &value, Namespace::AgentResponse, None)
            .await
            .unwrap();

        let snap = pool.stats();
        assert_eq!(snap.compression_saves, 1);
        assert!(snap.bytes_saved > 0);

        let back: Option<String> = pool.get("big", Namespace::AgentResponse).await.unwrap();
        assert_eq!(back.as_deref(), Some(value.as_str()));
    }

    #[tokio::test]
    async fn small_values_skip_compression() {
        let pool = mk_pool();
        pool.set("small", "x", Namespace::AgentResponse, None)
            .await
            .unwrap();
        assert_eq!(pool.stats().compression_saves, 0);
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let pool = mk_pool();
        pool.set("k", &1u32, Namespace::ProductInfo, None).await.unwrap();
        pool.set("k", &2u32, Namespace::SearchResult, None).await.unwrap();

        let a: Option<u32> = pool.get("k", Namespace::ProductInfo).await.unwrap();
        let b: Option<u32> = pool.get("k", Namespace::SearchResult).await.unwrap();
        assert_eq!(a, Some(1));
        assert_eq!(b, Some(2));
    }

    #[tokio::test]
    async fn delete_removes_value_and_counts() {
        let pool = mk_pool();
        pool.set("k", &true, Namespace::UserContext, None).await.unwrap();

        assert!(pool.delete("k", Namespace::UserContext).await.unwrap());
        assert!(!pool.delete("k", Namespace::UserContext).await.unwrap());

        let got: Option<bool> = pool.get("k", Namespace::UserContext).await.unwrap();
        assert!(got.is_none());
        assert_eq!(pool.stats().deletes, 1);
    }

    #[tokio::test]
    async fn counters_are_plain_integers() {
        let pool = mk_pool();
        assert_eq!(pool.incr("c", 1, Namespace::RateLimit).await.unwrap(), 1);
        assert_eq!(pool.incr("c", 1, Namespace::RateLimit).await.unwrap(), 2);
        assert_eq!(
            pool.get_count("c", Namespace::RateLimit).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn bytes_round_trip_as_binary() {
        let pool = mk_pool();
        let blob: Vec<u8> = (0..300u16).map(|i| (i % 256) as u8).collect();

        pool.set_bytes("emb", blob.clone(), Namespace::Embedding, None)
            .await
            .unwrap();
        let back = pool.get_bytes("emb", Namespace::Embedding).await.unwrap();
        assert_eq!(back, Some(blob));
    }

    #[tokio::test]
    async fn health_check_reports_healthy_in_memory() {
        let pool = mk_pool();
        let report = pool.health_check().await;
        assert_eq!(report.status, "healthy");
    }
}
