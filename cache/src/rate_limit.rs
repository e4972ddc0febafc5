//! Fixed-window rate limiting on top of the cache pool.
//!
//! Window accounting is a bare integer counter with a TTL armed on the
//! first increment. The race between the increment and the expire on a
//! brand-new key is accepted: the worst case is a single-window
//! overcount of one under adversarial interleaving, which is not worth
//! a transaction.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use crate::namespace::Namespace;
use crate::pool::CachePool;

pub const DEFAULT_IP_MAX: i64 = 100;
pub const DEFAULT_IP_WINDOW_SECS: u64 = 60;
pub const DEFAULT_USER_MAX: i64 = 50;
pub const DEFAULT_USER_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Ip,
    User,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::Ip => "ip",
            RateScope::User => "user",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub count: i64,
    pub max: i64,
    /// Seconds until the window resets.
    pub reset_in: u64,
}

pub struct RateLimiter {
    pool: Arc<CachePool>,
}

impl RateLimiter {
    pub fn new(pool: Arc<CachePool>) -> Self {
        Self { pool }
    }

    /// Fixed-window check-and-count for one identity in one scope.
    ///
    /// A transport failure fails open: the request is allowed and the
    /// error logged, because refusing real users over a cache outage is
    /// the worse trade.
    pub async fn check_limit(
        &self,
        id: &str,
        scope: RateScope,
        max: i64,
        window: Duration,
    ) -> RateDecision {
        let key = format!("{}:{}", scope.as_str(), id);
        let reset_in = window.as_secs();

        match self.try_check(&key, max, window).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, scope = scope.as_str(), "rate limit check failed; allowing");
                RateDecision {
                    allowed: true,
                    count: 0,
                    max,
                    reset_in,
                }
            }
        }
    }

    async fn try_check(&self, key: &str, max: i64, window: Duration) -> Result<RateDecision> {
        let reset_in = window.as_secs();

        let current = self
            .pool
            .get_count(key, Namespace::RateLimit)
            .await?
            .unwrap_or(0);

        if current >= max {
            return Ok(RateDecision {
                allowed: false,
                count: current,
                max,
                reset_in,
            });
        }

        let new_count = self.pool.incr(key, 1, Namespace::RateLimit).await?;
        if new_count == 1 {
            self.pool.expire(key, window, Namespace::RateLimit).await?;
        }

        Ok(RateDecision {
            allowed: true,
            count: new_count,
            max,
            reset_in,
        })
    }

    pub async fn check_ip(&self, ip: &str) -> RateDecision {
        self.check_limit(
            ip,
            RateScope::Ip,
            DEFAULT_IP_MAX,
            Duration::from_secs(DEFAULT_IP_WINDOW_SECS),
        )
        .await
    }

    pub async fn check_user(&self, user_id: &str) -> RateDecision {
        self.check_limit(
            user_id,
            RateScope::User,
            DEFAULT_USER_MAX,
            Duration::from_secs(DEFAULT_USER_WINDOW_SECS),
        )
        .await
    }

    /// Drop the counter for one identity (admin / test hook).
    pub async fn reset(&self, id: &str, scope: RateScope) -> Result<bool> {
        let key = format!("{}:{}", scope.as_str(), id);
        self.pool.delete(&key, Namespace::RateLimit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn mk_limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(CachePool::in_memory(CacheConfig::default())))
    }

    #[tokio::test]
    async fn allows_up_to_max_then_refuses() {
        let limiter = mk_limiter();
        let window = Duration::from_secs(60);

        for expected in 1..=2 {
            let d = limiter.check_limit("u1", RateScope::User, 2, window).await;
            assert!(d.allowed);
            assert_eq!(d.count, expected);
        }

        let d = limiter.check_limit("u1", RateScope::User, 2, window).await;
        assert!(!d.allowed);
        assert_eq!(d.count, 2);
        assert_eq!(d.reset_in, 60);
    }

    #[tokio::test]
    async fn scopes_and_identities_are_independent() {
        let limiter = mk_limiter();
        let window = Duration::from_secs(60);

        let _ = limiter.check_limit("a", RateScope::User, 1, window).await;
        let denied = limiter.check_limit("a", RateScope::User, 1, window).await;
        assert!(!denied.allowed);

        // Same id, different scope: fresh window.
        assert!(limiter.check_limit("a", RateScope::Ip, 1, window).await.allowed);
        // Different id, same scope: fresh window.
        assert!(limiter.check_limit("b", RateScope::User, 1, window).await.allowed);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = mk_limiter();
        let window = Duration::from_secs(60);

        let _ = limiter.check_limit("u1", RateScope::User, 1, window).await;
        assert!(!limiter.check_limit("u1", RateScope::User, 1, window).await.allowed);

        limiter.reset("u1", RateScope::User).await.unwrap();
        assert!(limiter.check_limit("u1", RateScope::User, 1, window).await.allowed);
    }
}
