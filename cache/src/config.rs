use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Cache transport endpoint.
    pub redis_url: String,

    // =========================
    // Connection management
    // =========================
    /// Upper bound on concurrent transport connections.
    pub max_connections: u32,

    /// Retry a command once after a transport failure (reconnect first).
    pub retry_on_timeout: bool,

    /// Interval for the background health probe.
    pub health_check_interval: Duration,

    // =========================
    // Compression
    // =========================
    /// Serialized payloads at or above this many bytes are candidates
    /// for compression. A candidate is stored compressed only when the
    /// compressed form is actually smaller.
    pub compression_threshold: usize,

    /// gzip level. 6 trades speed against ratio reasonably for
    /// cache-sized payloads.
    pub compression_level: u32,

    /// Eviction policy pushed to the store on connect (best-effort).
    pub max_memory_policy: &'static str,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            max_connections: 20,
            retry_on_timeout: true,
            health_check_interval: Duration::from_secs(30),
            compression_threshold: 1024,
            compression_level: 6,
            max_memory_policy: "allkeys-lru",
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Self {
            redis_url,
            ..Self::default()
        }
    }
}
