//! Memoization fronts for agent responses, product info, search results
//! and embeddings. Thin namespace dispatch over the pool plus the
//! fingerprint scheme used as the agent-response cache key.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::namespace::Namespace;
use crate::pool::CachePool;

/// Stable cache key for one (handler, message, user, context) turn.
///
/// The message is lowercased and whitespace-collapsed so trivially
/// reworded repeats still hit; context entries are folded in sorted
/// order so map iteration order cannot change the key.
pub fn fingerprint(
    handler_kind: &str,
    message: &str,
    user_id: Option<&str>,
    context: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let normalized = message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut parts = vec![handler_kind.to_string(), normalized];
    if let Some(uid) = user_id {
        parts.push(uid.to_string());
    }

    let mut keys: Vec<&String> = context.keys().collect();
    keys.sort();
    for k in keys {
        parts.push(format!("{}={}", k, context[k]));
    }

    format!("{:x}", md5::compute(parts.join("\u{1f}").as_bytes()))
}

pub struct ResponseCache {
    pool: Arc<CachePool>,
}

impl ResponseCache {
    pub fn new(pool: Arc<CachePool>) -> Self {
        Self { pool }
    }

    pub async fn cache_agent_response<T: Serialize>(
        &self,
        fingerprint: &str,
        response: &T,
    ) -> Result<()> {
        self.pool
            .set(fingerprint, response, Namespace::AgentResponse, None)
            .await
    }

    pub async fn get_cached_agent_response<T: DeserializeOwned>(
        &self,
        fingerprint: &str,
    ) -> Result<Option<T>> {
        self.pool.get(fingerprint, Namespace::AgentResponse).await
    }

    pub async fn cache_product_info<T: Serialize>(
        &self,
        product_id: &str,
        product: &T,
    ) -> Result<()> {
        self.pool
            .set(product_id, product, Namespace::ProductInfo, None)
            .await
    }

    pub async fn get_cached_product_info<T: DeserializeOwned>(
        &self,
        product_id: &str,
    ) -> Result<Option<T>> {
        self.pool.get(product_id, Namespace::ProductInfo).await
    }

    pub async fn invalidate_product_info(&self, product_id: &str) -> Result<bool> {
        self.pool.delete(product_id, Namespace::ProductInfo).await
    }

    pub async fn cache_search_result<T: Serialize>(
        &self,
        query_hash: &str,
        results: &T,
    ) -> Result<()> {
        self.pool
            .set(query_hash, results, Namespace::SearchResult, None)
            .await
    }

    pub async fn get_cached_search_result<T: DeserializeOwned>(
        &self,
        query_hash: &str,
    ) -> Result<Option<T>> {
        self.pool.get(query_hash, Namespace::SearchResult).await
    }

    pub async fn cache_embedding(&self, text_hash: &str, embedding: &[f32]) -> Result<()> {
        self.pool
            .set(text_hash, embedding, Namespace::Embedding, None)
            .await
    }

    pub async fn get_cached_embedding(&self, text_hash: &str) -> Result<Option<Vec<f32>>> {
        self.pool.get(text_hash, Namespace::Embedding).await
    }
}
