//! Abandoned-cart coordination.
//!
//! A scheduled job triggers the detection pass; a cart is abandoned
//! when it is valuable enough, idle past the window, and not already
//! recorded. Detection creates the record and schedules the delayed
//! email and SMS follow-ups as timer tasks on the runtime (no dedicated
//! threads). Dispatch is idempotent per channel: the record is re-read
//! before sending and the sent flag checked; SMS additionally requires
//! the email to have gone out first.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use cache::{CachePool, Namespace};
use common::audit::{AuditLogger, AuditSeverity};
use common::models::Cart;

use crate::model::AbandonedCart;

const INDEX_KEY: &str = "abandoned_cart_index";
const AUDIT_SUBSYSTEM: &str = "marketing";

/// Records older than this are purged by the cleanup job.
const MAX_RECORD_AGE_DAYS: i64 = 30;

#[async_trait::async_trait]
pub trait CartSource: Send + Sync {
    async fn active_carts(&self) -> Result<Vec<Cart>>;
}

#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_abandoned_cart_email(&self, to: &str, cart: &AbandonedCart) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_abandoned_cart_sms(&self, to: &str, cart: &AbandonedCart) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MarketingConfig {
    /// Idle duration after which a cart counts as abandoned.
    pub timeout: Duration,
    /// Carts below this value are not worth a follow-up.
    pub min_cart_value: f64,
    pub email_delay: Duration,
    pub sms_delay: Duration,
}

impl Default for MarketingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            min_cart_value: 5000.0,
            email_delay: Duration::from_secs(30 * 60),
            sms_delay: Duration::from_secs(2 * 3600),
        }
    }
}

impl MarketingConfig {
    pub fn from_env() -> Self {
        fn env_u64(name: &str, default: u64) -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        let timeout_minutes = env_u64("ABANDONED_CART_TIMEOUT_MINUTES", 30);
        let min_cart_value = std::env::var("MINIMUM_CART_VALUE_FOR_FOLLOWUP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000.0);
        let email_delay_minutes = env_u64("FOLLOW_UP_EMAIL_DELAY_MINUTES", 30);
        let sms_delay_hours = env_u64("FOLLOW_UP_SMS_DELAY_HOURS", 2);

        Self {
            timeout: Duration::from_secs(timeout_minutes * 60),
            min_cart_value,
            email_delay: Duration::from_secs(email_delay_minutes * 60),
            sms_delay: Duration::from_secs(sms_delay_hours * 3600),
        }
    }
}

pub struct CartCoordinator {
    pool: Arc<CachePool>,
    source: Arc<dyn CartSource>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    audit: AuditLogger,
    config: MarketingConfig,
}

impl CartCoordinator {
    pub fn new(
        pool: Arc<CachePool>,
        source: Arc<dyn CartSource>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        audit: AuditLogger,
        config: MarketingConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            source,
            email,
            sms,
            audit,
            config,
        })
    }

    /// One detection pass. Returns how many new abandonments were
    /// recorded (the job result payload).
    #[instrument(skip(self), target = "marketing")]
    pub async fn detect(self: &Arc<Self>) -> Result<u64> {
        let carts = self.source.active_carts().await?;
        let now = Utc::now();
        let mut detected = 0u64;

        for cart in carts {
            if !self.is_abandoned(&cart, now).await? {
                continue;
            }

            let record = AbandonedCart::from_cart(&cart);
            self.save(&record).await?;
            self.add_to_index(&record.cart_id).await?;
            self.schedule_follow_ups(record.cart_id.clone());

            self.audit.log_event(
                "cart_abandoned",
                AuditSeverity::Info,
                Some(&record.user_id),
                None,
                AUDIT_SUBSYSTEM,
                serde_json::json!({
                    "cart_id": record.cart_id,
                    "total_value": record.total_value,
                }),
            );

            detected += 1;
        }

        if detected > 0 {
            info!(detected, "abandonment detection pass complete");
        }
        Ok(detected)
    }

    async fn is_abandoned(&self, cart: &Cart, now: chrono::DateTime<Utc>) -> Result<bool> {
        if cart.total_value < self.config.min_cart_value {
            return Ok(false);
        }

        let idle = now - cart.last_activity;
        if idle.num_seconds() < self.config.timeout.as_secs() as i64 {
            return Ok(false);
        }

        // Already recorded once; never flag the same cart twice.
        Ok(self.record(&cart.cart_id).await?.is_none())
    }

    /// Delayed follow-ups on the runtime timer. One task per channel;
    /// failures are logged, never propagated into the detection pass.
    fn schedule_follow_ups(self: &Arc<Self>, cart_id: String) {
        let coordinator = Arc::clone(self);
        let id = cart_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(coordinator.config.email_delay).await;
            if let Err(e) = coordinator.dispatch_email(&id).await {
                warn!(cart_id = %id, error = %e, "email follow-up failed");
            }
        });

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(coordinator.config.sms_delay).await;
            if let Err(e) = coordinator.dispatch_sms(&cart_id).await {
                warn!(cart_id = %cart_id, error = %e, "sms follow-up failed");
            }
        });
    }

    /// Idempotent email dispatch. Returns whether an email has been
    /// sent for this cart (now or previously).
    #[instrument(skip(self), target = "marketing")]
    pub async fn dispatch_email(&self, cart_id: &str) -> Result<bool> {
        let Some(record) = self.record(cart_id).await? else {
            warn!(cart_id, "no abandoned-cart record for email follow-up");
            return Ok(false);
        };

        if record.email_sent {
            debug!(cart_id, "email already sent; skipping");
            return Ok(true);
        }
        if record.recovered {
            debug!(cart_id, "cart recovered; skipping email");
            return Ok(false);
        }

        let Some(address) = record.customer_email.clone() else {
            warn!(cart_id, "no email address on record");
            return Ok(false);
        };

        self.email
            .send_abandoned_cart_email(&address, &record)
            .await
            .context("email transport failed")?;

        self.mark_sent(cart_id, Channel::Email).await?;

        self.audit.log_event(
            "follow_up_email_sent",
            AuditSeverity::Info,
            Some(&record.user_id),
            None,
            AUDIT_SUBSYSTEM,
            serde_json::json!({ "cart_id": cart_id }),
        );
        Ok(true)
    }

    /// Idempotent SMS dispatch. Only fires once the email follow-up has
    /// gone out.
    #[instrument(skip(self), target = "marketing")]
    pub async fn dispatch_sms(&self, cart_id: &str) -> Result<bool> {
        let Some(record) = self.record(cart_id).await? else {
            warn!(cart_id, "no abandoned-cart record for sms follow-up");
            return Ok(false);
        };

        if record.sms_sent {
            debug!(cart_id, "sms already sent; skipping");
            return Ok(true);
        }
        if record.recovered {
            debug!(cart_id, "cart recovered; skipping sms");
            return Ok(false);
        }
        if !record.email_sent {
            warn!(cart_id, "email not yet dispatched; withholding sms");
            return Ok(false);
        }

        let Some(number) = record.customer_phone.clone() else {
            warn!(cart_id, "no phone number on record");
            return Ok(false);
        };

        self.sms
            .send_abandoned_cart_sms(&number, &record)
            .await
            .context("sms transport failed")?;

        self.mark_sent(cart_id, Channel::Sms).await?;

        self.audit.log_event(
            "follow_up_sms_sent",
            AuditSeverity::Info,
            Some(&record.user_id),
            None,
            AUDIT_SUBSYSTEM,
            serde_json::json!({ "cart_id": cart_id }),
        );
        Ok(true)
    }

    /// The user came back and ordered; stop bothering them.
    pub async fn mark_recovered(&self, cart_id: &str) -> Result<bool> {
        let Some(mut record) = self.record(cart_id).await? else {
            return Ok(false);
        };
        if !record.recovered {
            record.recovered = true;
            self.save(&record).await?;
            info!(cart_id, "cart recovered");
        }
        Ok(true)
    }

    /// Purge records past the retention window. Returns the purge count
    /// (the cleanup job result payload).
    #[instrument(skip(self), target = "marketing")]
    pub async fn cleanup(&self) -> Result<u64> {
        let ids: Vec<String> = self
            .pool
            .get(INDEX_KEY, Namespace::Marketing)
            .await?
            .unwrap_or_default();

        let now = Utc::now();
        let mut kept = Vec::with_capacity(ids.len());
        let mut purged = 0u64;

        for id in ids {
            match self.record(&id).await? {
                Some(record) if record.age_days(now) >= MAX_RECORD_AGE_DAYS => {
                    self.pool.delete(&id, Namespace::Marketing).await?;
                    purged += 1;
                }
                Some(_) => kept.push(id),
                // Record expired on its own; drop the index entry.
                None => purged += 1,
            }
        }

        self.pool
            .set(INDEX_KEY, &kept, Namespace::Marketing, None)
            .await?;

        if purged > 0 {
            info!(purged, "old abandoned-cart records purged");
        }
        Ok(purged)
    }

    pub async fn record(&self, cart_id: &str) -> Result<Option<AbandonedCart>> {
        self.pool.get(cart_id, Namespace::Marketing).await
    }

    async fn save(&self, record: &AbandonedCart) -> Result<()> {
        self.pool
            .set(&record.cart_id, record, Namespace::Marketing, None)
            .await
            .context("failed to persist abandoned-cart record")
    }

    async fn mark_sent(&self, cart_id: &str, channel: Channel) -> Result<()> {
        // Re-read and flip flag + counter together; single-process
        // deployment makes this the atomic unit.
        let Some(mut record) = self.record(cart_id).await? else {
            anyhow::bail!("abandoned-cart record vanished mid-dispatch: {cart_id}");
        };

        match channel {
            Channel::Email => record.email_sent = true,
            Channel::Sms => record.sms_sent = true,
        }
        record.follow_up_count += 1;

        self.save(&record).await
    }

    async fn add_to_index(&self, cart_id: &str) -> Result<()> {
        let mut ids: Vec<String> = self
            .pool
            .get(INDEX_KEY, Namespace::Marketing)
            .await?
            .unwrap_or_default();

        if !ids.iter().any(|id| id == cart_id) {
            ids.push(cart_id.to_string());
        }

        self.pool
            .set(INDEX_KEY, &ids, Namespace::Marketing, None)
            .await
            .context("failed to update abandoned-cart index")
    }
}

#[derive(Clone, Copy)]
enum Channel {
    Email,
    Sms,
}
