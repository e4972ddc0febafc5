//! In-memory transport with the same observable semantics as the redis
//! one (TTL expiry, payload/sidecar pairing, integer counters). Selected
//! in TESTING mode so the full stack, compression accounting included,
//! runs without a live store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;

use super::CacheTransport;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
pub struct MemoryTransport {
    map: Mutex<HashMap<String, Entry>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) keys. Test helper.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.lock().values().filter(|e| !e.expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut map = self.map.lock();
        if map.get(key).is_some_and(|e| e.expired(now)) {
            map.remove(key);
            return None;
        }
        map.get(key).map(|e| e.value.clone())
    }
}

#[async_trait::async_trait]
impl CacheTransport for MemoryTransport {
    async fn set_pair(
        &self,
        key: &str,
        payload: &[u8],
        meta_key: &str,
        meta: &[u8],
        ttl: Duration,
    ) -> Result<()> {
        let expires_at = Some(Instant::now() + ttl);
        let mut map = self.map.lock();
        map.insert(
            key.to_string(),
            Entry {
                value: payload.to_vec(),
                expires_at,
            },
        );
        map.insert(
            meta_key.to_string(),
            Entry {
                value: meta.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_pair(
        &self,
        key: &str,
        meta_key: &str,
    ) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        let Some(payload) = self.get_live(key) else {
            return Ok(None);
        };
        Ok(Some((payload, self.get_live(meta_key))))
    }

    async fn delete_pair(&self, key: &str, meta_key: &str) -> Result<bool> {
        let mut map = self.map.lock();
        let a = map.remove(key).is_some();
        let b = map.remove(meta_key).is_some();
        Ok(a || b)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get_live(key).is_some())
    }

    async fn expire_pair(&self, key: &str, meta_key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let new_expiry = Some(now + ttl);
        let mut map = self.map.lock();

        let mut found = false;
        if let Some(entry) = map.get_mut(key) {
            if !entry.expired(now) {
                entry.expires_at = new_expiry;
                found = true;
            }
        }
        if let Some(entry) = map.get_mut(meta_key) {
            if !entry.expired(now) {
                entry.expires_at = new_expiry;
            }
        }
        Ok(found)
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let now = Instant::now();
        let mut map = self.map.lock();

        let current = match map.get(key) {
            Some(entry) if !entry.expired(now) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| anyhow::anyhow!("counter key holds a non-integer value"))?,
            _ => 0,
        };

        let next = current + amount;
        let expires_at = match map.get(key) {
            Some(entry) if !entry.expired(now) => entry.expires_at,
            _ => None,
        };
        map.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>> {
        match self.get_live(key) {
            Some(bytes) => {
                let n = std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| anyhow::anyhow!("counter key holds a non-integer value"))?;
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_round_trip_and_delete() {
        let t = MemoryTransport::new();
        t.set_pair("k", b"v", "k:meta", b"m", Duration::from_secs(60))
            .await
            .unwrap();

        let (payload, meta) = t.get_pair("k", "k:meta").await.unwrap().unwrap();
        assert_eq!(payload, b"v");
        assert_eq!(meta.as_deref(), Some(b"m".as_ref()));

        assert!(t.delete_pair("k", "k:meta").await.unwrap());
        assert!(t.get_pair("k", "k:meta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let t = MemoryTransport::new();
        t.set_pair("k", b"v", "k:meta", b"m", Duration::from_nanos(1))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert!(t.get_pair("k", "k:meta").await.unwrap().is_none());
        assert!(!t.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn counters_are_integers_end_to_end() {
        let t = MemoryTransport::new();
        assert_eq!(t.incr_by("c", 1).await.unwrap(), 1);
        assert_eq!(t.incr_by("c", 2).await.unwrap(), 3);
        assert_eq!(t.get_counter("c").await.unwrap(), Some(3));
        assert_eq!(t.get_counter("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expire_rearms_ttl_only_for_live_keys() {
        let t = MemoryTransport::new();
        assert!(
            !t.expire_pair("nope", "nope:meta", Duration::from_secs(5))
                .await
                .unwrap()
        );

        t.set_pair("k", b"v", "k:meta", b"m", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(t.expire_pair("k", "k:meta", Duration::from_secs(5)).await.unwrap());
    }
}
