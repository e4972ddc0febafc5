use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// One user session. Created on the first message from a new
/// user/device, bumped on every access, destroyed on logout or TTL
/// expiry.
///
/// Invariant: `expires_at > last_activity` at all times; both move
/// together through [`Session::touch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub device_info: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn new(
        session_id: String,
        user_id: String,
        device_info: Option<serde_json::Value>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        ttl: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            device_info,
            ip_address,
            user_agent,
            started_at: now,
            last_activity: now,
            is_active: true,
            expires_at: now + ChronoDuration::seconds(ttl.as_secs() as i64),
            context: serde_json::Map::new(),
        }
    }

    /// Bump `last_activity` and slide `expires_at` forward by `ttl`.
    pub fn touch(&mut self, ttl: std::time::Duration) {
        let now = Utc::now();
        self.last_activity = now;
        self.expires_at = now + ChronoDuration::seconds(ttl.as_secs() as i64);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Active and not past expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_session_upholds_expiry_invariant() {
        let s = Session::new(
            "s1".into(),
            "u1".into(),
            None,
            None,
            None,
            Duration::from_secs(1800),
        );
        assert!(s.expires_at > s.last_activity);
        assert!(s.is_live(Utc::now()));
    }

    #[test]
    fn touch_slides_both_timestamps() {
        let mut s = Session::new(
            "s1".into(),
            "u1".into(),
            None,
            None,
            None,
            Duration::from_secs(1800),
        );
        let old_expiry = s.expires_at;

        std::thread::sleep(Duration::from_millis(5));
        s.touch(Duration::from_secs(1800));

        assert!(s.expires_at >= old_expiry);
        assert!(s.expires_at > s.last_activity);
    }

    #[test]
    fn expired_session_is_not_live() {
        let mut s = Session::new(
            "s1".into(),
            "u1".into(),
            None,
            None,
            None,
            Duration::from_secs(1800),
        );
        s.expires_at = Utc::now() - ChronoDuration::seconds(1);
        assert!(!s.is_live(Utc::now()));
    }
}
