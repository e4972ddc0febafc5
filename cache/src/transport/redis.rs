//! Redis-backed transport.
//!
//! One multiplexed async connection serves all namespaces. Commands are
//! retried once after a transport failure, reconnecting in between;
//! beyond that, errors surface to the pool (callers treat the cache as
//! best-effort).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::FromRedisValue;
use tokio::sync::Mutex;

use super::CacheTransport;
use crate::config::CacheConfig;

pub struct RedisTransport {
    client: redis::Client,
    connection: Arc<Mutex<Option<redis::aio::MultiplexedConnection>>>,
    retry_on_failure: bool,
}

impl RedisTransport {
    /// Build the client and verify connectivity with a ping. Also pushes
    /// the configured eviction policy to the store; a refusal (managed
    /// Redis forbids CONFIG) is logged and ignored.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .with_context(|| format!("invalid redis url: {}", config.redis_url))?;

        let transport = Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            retry_on_failure: config.retry_on_timeout,
        };

        transport.ping().await.context("initial redis ping failed")?;

        let policy_result: Result<()> = transport
            .run_command("config_set_policy", || {
                let mut cmd = redis::cmd("CONFIG");
                cmd.arg("SET").arg("maxmemory-policy").arg(config.max_memory_policy);
                cmd
            })
            .await;
        if let Err(e) = policy_result {
            tracing::warn!(error = %e, "could not set maxmemory-policy; continuing");
        }

        tracing::info!(
            url = %config.redis_url,
            max_connections = config.max_connections,
            "redis transport connected"
        );

        Ok(transport)
    }

    async fn ensure_connection(
        &self,
        connection: &mut Option<redis::aio::MultiplexedConnection>,
    ) -> Result<()> {
        if connection.is_some() {
            return Ok(());
        }
        *connection = Some(
            self.client
                .get_multiplexed_async_connection()
                .await
                .context("failed to open redis connection")?,
        );
        tracing::debug!("redis connection (re)established");
        Ok(())
    }

    async fn run_command<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Cmd,
    {
        let attempts = if self.retry_on_failure { 2 } else { 1 };
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..attempts {
            let mut conn_guard = self.connection.lock().await;
            self.ensure_connection(&mut conn_guard).await?;
            let conn = conn_guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("redis connection unavailable"))?;

            let cmd = build();
            let result: redis::RedisResult<T> = cmd.query_async(conn).await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "redis command failed; dropping connection"
                    );
                    *conn_guard = None;
                    last_err = Some(anyhow::anyhow!(err).context(operation));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("redis command failed: {operation}")))
    }

    async fn run_pipeline<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Pipeline,
    {
        let attempts = if self.retry_on_failure { 2 } else { 1 };
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..attempts {
            let mut conn_guard = self.connection.lock().await;
            self.ensure_connection(&mut conn_guard).await?;
            let conn = conn_guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("redis connection unavailable"))?;

            let pipe = build();
            let result: redis::RedisResult<T> = pipe.query_async(conn).await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "redis pipeline failed; dropping connection"
                    );
                    *conn_guard = None;
                    last_err = Some(anyhow::anyhow!(err).context(operation));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("redis pipeline failed: {operation}")))
    }
}

#[async_trait::async_trait]
impl CacheTransport for RedisTransport {
    async fn set_pair(
        &self,
        key: &str,
        payload: &[u8],
        meta_key: &str,
        meta: &[u8],
        ttl: Duration,
    ) -> Result<()> {
        let ttl_secs = ttl.as_secs().max(1);
        self.run_pipeline::<(), _>("set_pair", || {
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.cmd("SET").arg(key).arg(payload).arg("EX").arg(ttl_secs).ignore();
            pipe.cmd("SET").arg(meta_key).arg(meta).arg("EX").arg(ttl_secs).ignore();
            pipe
        })
        .await
    }

    async fn get_pair(
        &self,
        key: &str,
        meta_key: &str,
    ) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        let (payload, meta): (Option<Vec<u8>>, Option<Vec<u8>>) = self
            .run_pipeline("get_pair", || {
                let mut pipe = redis::pipe();
                pipe.cmd("GET").arg(key);
                pipe.cmd("GET").arg(meta_key);
                pipe
            })
            .await?;

        Ok(payload.map(|p| (p, meta)))
    }

    async fn delete_pair(&self, key: &str, meta_key: &str) -> Result<bool> {
        let removed: i64 = self
            .run_command("delete_pair", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(key).arg(meta_key);
                cmd
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found: i64 = self
            .run_command("exists", || {
                let mut cmd = redis::cmd("EXISTS");
                cmd.arg(key);
                cmd
            })
            .await?;
        Ok(found > 0)
    }

    async fn expire_pair(&self, key: &str, meta_key: &str, ttl: Duration) -> Result<bool> {
        let ttl_secs = ttl.as_secs().max(1);
        let (data_ok, _meta_ok): (i64, i64) = self
            .run_pipeline("expire_pair", || {
                let mut pipe = redis::pipe();
                pipe.cmd("EXPIRE").arg(key).arg(ttl_secs);
                pipe.cmd("EXPIRE").arg(meta_key).arg(ttl_secs);
                pipe
            })
            .await?;
        Ok(data_ok > 0)
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.run_command("incr_by", || {
            let mut cmd = redis::cmd("INCRBY");
            cmd.arg(key).arg(amount);
            cmd
        })
        .await
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>> {
        self.run_command("get_counter", || {
            let mut cmd = redis::cmd("GET");
            cmd.arg(key);
            cmd
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self
            .run_command("ping", || redis::cmd("PING"))
            .await?;
        Ok(())
    }
}
