use std::time::Duration;

use cache::CacheConfig;
use marketing::MarketingConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Cache transport settings (REDIS_URL and tuning knobs).
    pub cache: CacheConfig,

    /// Marketing automation windows and thresholds.
    pub marketing: MarketingConfig,

    // =========================
    // Router configuration
    // =========================
    /// Deadline for one handler invocation. A turn that exceeds it gets
    /// the canned timeout response; the handler task is cancelled.
    pub handler_timeout: Duration,

    // =========================
    // Process lifecycle
    // =========================
    /// How long in-flight turns get to finish at shutdown before the
    /// process exits anyway.
    pub shutdown_grace: Duration,

    /// TESTING=true swaps the cache transport for the in-memory stub.
    pub testing: bool,

    /// APP_ENV=production switches log output to JSON.
    pub production: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let testing = std::env::var("TESTING").is_ok_and(|v| v == "true" || v == "1");
        let production = std::env::var("APP_ENV").is_ok_and(|v| v == "production");

        let handler_timeout_secs = std::env::var("ROUTER_HANDLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30u64);

        let shutdown_grace_secs = std::env::var("SHUTDOWN_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5u64);

        Self {
            cache: CacheConfig::from_env(),
            marketing: MarketingConfig::from_env(),
            handler_timeout: Duration::from_secs(handler_timeout_secs),
            shutdown_grace: Duration::from_secs(shutdown_grace_secs),
            testing,
            production,
        }
    }
}
