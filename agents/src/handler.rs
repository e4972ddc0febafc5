//! Uniform handler contract.
//!
//! Every specialized handler exposes `handle(message, deps)` and a
//! descriptor (name, system prompt, tool descriptors) the external LLM
//! layer consumes; both prompt and tools are opaque to the router.
//! Handlers never panic and never return an error: any internal failure
//! becomes a `confidence = 0` response with `metadata.error_type` set.

use crate::deps::AgentDeps;
use crate::types::{AgentResponse, HandlerKind};

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON-schema-shaped parameter spec, passed through untouched.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub tools: Vec<ToolDescriptor>,
}

#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    fn descriptor(&self) -> HandlerDescriptor;

    async fn handle(&self, message: &str, deps: &AgentDeps) -> AgentResponse;
}

/// Convert an internal handler failure into the degraded response the
/// contract requires, auditing it on the way out.
pub fn failure_response(kind: HandlerKind, deps: &AgentDeps, error: &anyhow::Error) -> AgentResponse {
    deps.audit.log_error(
        "handler_failure",
        &error.to_string(),
        deps.user_id(),
        None,
        kind.as_str(),
        serde_json::json!({}),
    );

    AgentResponse::new(
        kind,
        "Sajnálom, hiba történt a kérés feldolgozása során. Kérlek, próbáld újra később.",
        0.0,
    )
    .with_meta("error_type", serde_json::json!("handler_failure"))
    .with_meta("error_message", serde_json::json!(error.to_string()))
}
