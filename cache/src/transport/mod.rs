pub mod memory;
pub mod redis;

use std::time::Duration;

pub use memory::MemoryTransport;
pub use redis::RedisTransport;

/// Raw key-value transport behind the cache pool.
///
/// Implementations must be safe to share across tasks. All failures are
/// transport failures; a missing key is `Ok(None)`.
#[async_trait::async_trait]
pub trait CacheTransport: Send + Sync {
    /// Write payload and sidecar metadata under one TTL, atomically
    /// enough that both either land or neither does.
    async fn set_pair(
        &self,
        key: &str,
        payload: &[u8],
        meta_key: &str,
        meta: &[u8],
        ttl: Duration,
    ) -> anyhow::Result<()>;

    /// Read payload and sidecar in one round trip. `None` when the
    /// payload key is absent; the sidecar may be absent independently.
    async fn get_pair(
        &self,
        key: &str,
        meta_key: &str,
    ) -> anyhow::Result<Option<(Vec<u8>, Option<Vec<u8>>)>>;

    /// Remove payload and sidecar. Returns whether anything was removed.
    async fn delete_pair(&self, key: &str, meta_key: &str) -> anyhow::Result<bool>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Re-arm the TTL on payload and sidecar. Returns whether the
    /// payload key existed.
    async fn expire_pair(&self, key: &str, meta_key: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Integer increment on a bare counter key (no sidecar, no codec).
    async fn incr_by(&self, key: &str, amount: i64) -> anyhow::Result<i64>;

    /// Read a bare counter key.
    async fn get_counter(&self, key: &str) -> anyhow::Result<Option<i64>>;

    async fn ping(&self) -> anyhow::Result<()>;
}
