//! Structured audit sink shared by every subsystem.
//!
//! Responsibilities:
//! - Accept audit records from any task without blocking the caller.
//! - Forward them to a pluggable backend on a single consumer task.
//! - Drop (and count) records when the bounded buffer is full.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Debug => "debug",
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
            AuditSeverity::Critical => "critical",
        }
    }
}

/// One audit record. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: String,
    pub severity: AuditSeverity,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub subsystem: String,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Backend that actually persists / emits audit records.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: AuditRecord);
}

/// Default sink: emits records as structured tracing events.
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, record: AuditRecord) {
        match record.severity {
            AuditSeverity::Error | AuditSeverity::Critical => tracing::error!(
                target: "audit",
                kind = %record.kind,
                subsystem = %record.subsystem,
                user_id = record.user_id.as_deref().unwrap_or("-"),
                payload = %record.payload,
                "audit event"
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: "audit",
                kind = %record.kind,
                subsystem = %record.subsystem,
                user_id = record.user_id.as_deref().unwrap_or("-"),
                payload = %record.payload,
                "audit event"
            ),
            _ => tracing::info!(
                target: "audit",
                kind = %record.kind,
                subsystem = %record.subsystem,
                user_id = record.user_id.as_deref().unwrap_or("-"),
                payload = %record.payload,
                "audit event"
            ),
        }
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: parking_lot::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

/// Handle used by all components to emit audit records.
///
/// `log_event` / `log_error` never block: a full buffer drops the record
/// and bumps `dropped()`.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditRecord>,
    dropped: Arc<AtomicU64>,
}

impl AuditLogger {
    /// Spawn the consumer task and return the logger plus its join handle
    /// (awaited at shutdown to drain remaining records).
    pub fn spawn(sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_buffer(sink, DEFAULT_BUFFER)
    }

    pub fn spawn_with_buffer(sink: Arc<dyn AuditSink>, buffer: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(buffer.max(1));

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                sink.write(record).await;
            }
        });

        let logger = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        (logger, handle)
    }

    pub fn log_event(
        &self,
        kind: &str,
        severity: AuditSeverity,
        user_id: Option<&str>,
        session_id: Option<&str>,
        subsystem: &str,
        payload: serde_json::Value,
    ) {
        let record = AuditRecord {
            kind: kind.to_string(),
            severity,
            user_id: user_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
            subsystem: subsystem.to_string(),
            payload,
            at: Utc::now(),
        };

        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn log_error(
        &self,
        kind: &str,
        message: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        subsystem: &str,
        mut payload: serde_json::Value,
    ) {
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert(
                "error_message".to_string(),
                serde_json::Value::String(message.to_string()),
            );
        } else {
            payload = serde_json::json!({ "error_message": message, "details": payload });
        }

        self.log_event(
            kind,
            AuditSeverity::Error,
            user_id,
            session_id,
            subsystem,
            payload,
        );
    }

    /// Records dropped due to a full buffer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
