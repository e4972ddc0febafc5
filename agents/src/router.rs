//! Agent router: the single entry point for an inbound user turn.
//!
//! Flow per turn:
//! 1) Resolve or create the session.
//! 2) Rate-limit the user; refuse without touching a handler when over.
//! 3) Classify the intent (deterministic rules).
//! 4) Response-cache lookup by fingerprint; serve hits directly.
//! 5) Dispatch to exactly one handler under the turn deadline.
//! 6) Cache successful responses.
//! 7) Audit — exactly one record per exit path.
//!
//! The router never throws: every path produces a valid AgentResponse.
//! Cache failures degrade to recomputation; handler failures surface as
//! confidence-0 responses and are not retried here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use cache::response::fingerprint;
use cache::{RateLimiter, RateScope, ResponseCache};
use common::audit::{AuditLogger, AuditSeverity};
use common::logger::warn_if_slow;
use session::SessionStore;

use crate::classifier::IntentClassifier;
use crate::deps::AgentDeps;
use crate::registry::HandlerRegistry;
use crate::types::{AgentResponse, HandlerKind};

const REFUSAL_TEXT: &str = "Túl sok kérést küldtél rövid idő alatt. \
    Kérlek, várj egy kicsit, és próbáld újra!";

const TIMEOUT_TEXT: &str = "A válasz elkészítése a vártnál tovább tart. \
    Kérlek, próbáld meg újra egy kicsit később!";

/// Handlers slower than this get a performance warning well before the
/// hard deadline cuts them off.
const SLOW_DISPATCH: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-turn handler deadline.
    pub handler_timeout: Duration,
    pub user_rate_max: i64,
    pub user_rate_window: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            user_rate_max: cache::rate_limit::DEFAULT_USER_MAX,
            user_rate_window: Duration::from_secs(cache::rate_limit::DEFAULT_USER_WINDOW_SECS),
        }
    }
}

pub struct Router {
    sessions: Arc<SessionStore>,
    limiter: RateLimiter,
    responses: ResponseCache,
    registry: HandlerRegistry,
    classifier: IntentClassifier,
    base_deps: AgentDeps,
    audit: AuditLogger,
    config: RouterConfig,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionStore>,
        limiter: RateLimiter,
        responses: ResponseCache,
        registry: HandlerRegistry,
        base_deps: AgentDeps,
        audit: AuditLogger,
        config: RouterConfig,
    ) -> Self {
        Self {
            sessions,
            limiter,
            responses,
            registry,
            classifier: IntentClassifier::new(),
            base_deps,
            audit,
            config,
        }
    }

    /// Route one user turn. Exactly one handler sees the message; the
    /// returned `handler_kind` always equals the classifier's decision.
    #[instrument(
        skip(self, message, user_context),
        target = "router",
        fields(user_id = %user_id)
    )]
    pub async fn route(
        &self,
        message: &str,
        user_id: &str,
        session_id: &str,
        user_context: serde_json::Map<String, serde_json::Value>,
    ) -> AgentResponse {
        let start = Instant::now();

        // 1) Session. A cache outage here must not take the turn down.
        let effective_session_id = self.resolve_session(user_id, session_id).await;

        // 2) Rate limit before any handler work.
        let decision = self
            .limiter
            .check_limit(
                user_id,
                RateScope::User,
                self.config.user_rate_max,
                self.config.user_rate_window,
            )
            .await;

        if !decision.allowed {
            let response = AgentResponse::new(HandlerKind::General, REFUSAL_TEXT, 0.0)
                .with_meta("error_type", serde_json::json!("rate_limit_exceeded"))
                .with_meta("reset_in", serde_json::json!(decision.reset_in));

            self.audit_turn(
                "rate_limit_exceeded",
                AuditSeverity::Warning,
                user_id,
                &effective_session_id,
                &response,
                start,
                false,
            );
            return response;
        }

        // 3) Classify.
        let intent = self.classifier.classify(message);
        debug!(
            handler_kind = intent.handler_kind.as_str(),
            confidence = intent.confidence,
            "intent classified"
        );

        // 4) Response cache.
        let fp = fingerprint(
            intent.handler_kind.as_str(),
            message,
            Some(user_id),
            &user_context,
        );

        match self.responses.get_cached_agent_response::<AgentResponse>(&fp).await {
            Ok(Some(mut cached)) => {
                cached.metadata.insert("cached".into(), serde_json::json!(true));
                self.audit_turn(
                    "turn_completed",
                    AuditSeverity::Info,
                    user_id,
                    &effective_session_id,
                    &cached,
                    start,
                    true,
                );
                return cached;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "response cache lookup failed; treating as miss"),
        }

        // 5) Dispatch under the turn deadline.
        let mut turn_context = user_context;
        turn_context.insert("user_id".into(), serde_json::json!(user_id));
        turn_context.insert("session_id".into(), serde_json::json!(effective_session_id));
        turn_context.extend(
            intent
                .extracted_entities
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let deps = self.base_deps.with_context(turn_context);

        let mut response = self
            .dispatch(intent.handler_kind, message, &deps)
            .await;

        // A handler may not reroute mid-flight.
        debug_assert_eq!(response.handler_kind, intent.handler_kind);
        response.handler_kind = intent.handler_kind;
        response
            .metadata
            .insert("intent_confidence".into(), serde_json::json!(intent.confidence));

        // 6) Cache only meaningful answers.
        if response.confidence > 0.0 {
            if let Err(e) = self.responses.cache_agent_response(&fp, &response).await {
                warn!(error = %e, "failed to cache agent response");
            }
        }

        // 7) One audit record for this exit path.
        let (kind, severity) = if response.confidence == 0.0 {
            ("turn_degraded", AuditSeverity::Warning)
        } else {
            ("turn_completed", AuditSeverity::Info)
        };
        self.audit_turn(
            kind,
            severity,
            user_id,
            &effective_session_id,
            &response,
            start,
            false,
        );

        response
    }

    async fn resolve_session(&self, user_id: &str, session_id: &str) -> String {
        match self.sessions.get_session(session_id).await {
            Ok(Some(session)) => session.session_id,
            Ok(None) => match self.sessions.create_session(user_id, None, None, None).await {
                Ok(new_id) => new_id,
                Err(e) => {
                    warn!(error = %e, "session create failed; continuing without session");
                    session_id.to_string()
                }
            },
            Err(e) => {
                warn!(error = %e, "session lookup failed; continuing without session");
                session_id.to_string()
            }
        }
    }

    async fn dispatch(
        &self,
        kind: HandlerKind,
        message: &str,
        deps: &AgentDeps,
    ) -> AgentResponse {
        let Some(handler) = self.registry.get(kind) else {
            // Unreachable with the default registry; degrade anyway.
            return AgentResponse::new(
                kind,
                "Sajnálom, ezt a kérést most nem tudom feldolgozni.",
                0.0,
            )
            .with_meta("error_type", serde_json::json!("handler_missing"));
        };

        match warn_if_slow(
            "handler_dispatch",
            SLOW_DISPATCH,
            tokio::time::timeout(self.config.handler_timeout, handler.handle(message, deps)),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => AgentResponse::new(kind, TIMEOUT_TEXT, 0.0)
                .with_meta("error_type", serde_json::json!("handler_timeout")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn audit_turn(
        &self,
        kind: &str,
        severity: AuditSeverity,
        user_id: &str,
        session_id: &str,
        response: &AgentResponse,
        start: Instant,
        cache_hit: bool,
    ) {
        self.audit.log_event(
            kind,
            severity,
            Some(user_id),
            Some(session_id),
            "router",
            serde_json::json!({
                "handler_kind": response.handler_kind.as_str(),
                "confidence": response.confidence,
                "latency_ms": start.elapsed().as_millis() as u64,
                "cache_hit": cache_hit,
                "error_type": response.metadata.get("error_type"),
            }),
        );
    }
}
