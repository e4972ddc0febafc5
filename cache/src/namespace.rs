use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical cache partition. Each namespace carries its own default TTL,
/// tuned to how the data behind it behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Session,
    AgentResponse,
    ProductInfo,
    SearchResult,
    Embedding,
    UserContext,
    RateLimit,
    /// Abandoned-cart records (persistence, not memoization).
    Marketing,
    /// Job history and conflict resolutions (persistence, not memoization).
    Sync,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Session => "session",
            Namespace::AgentResponse => "agent_response",
            Namespace::ProductInfo => "product_info",
            Namespace::SearchResult => "search_result",
            Namespace::Embedding => "embedding",
            Namespace::UserContext => "user_context",
            Namespace::RateLimit => "rate_limit",
            Namespace::Marketing => "marketing",
            Namespace::Sync => "sync",
        }
    }

    /// Default TTL per namespace.
    ///
    /// Sessions run 30 minutes (down from a historical 24 h) to balance
    /// recency against memory. Embeddings keep 2 h because recomputation
    /// is expensive; search results only 10 min because the underlying
    /// data drifts quickly.
    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            Namespace::Session => 1800,
            Namespace::AgentResponse => 900,
            Namespace::ProductInfo => 3600,
            Namespace::SearchResult => 600,
            Namespace::Embedding => 7200,
            Namespace::UserContext => 1800,
            Namespace::RateLimit => 3600,
            Namespace::Marketing => 30 * 24 * 3600,
            Namespace::Sync => 7 * 24 * 3600,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
