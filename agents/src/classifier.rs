//! Rule-based intent classification.
//!
//! Deterministic and order-sensitive: marketing > recommendation >
//! order > product > general. Matching is case-insensitive substring
//! (keyword stems) or regex (order / tracking ids). The same message
//! always yields the same decision.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::types::HandlerKind;

const MARKETING_KEYWORDS: &[&str] = &["kedvezmény", "akció", "promóció", "kupon", "newsletter"];
const RECOMMENDATION_KEYWORDS: &[&str] = &["ajánl", "hasonló", "népszerű", "trend"];
const ORDER_KEYWORDS: &[&str] = &["rendelés", "szállítás", "státusz", "tracking", "követés"];
const PRODUCT_KEYWORDS: &[&str] = &["termék", "telefon", "ár", "készlet", "specifik"];

const STRONG_CONFIDENCE: f64 = 0.9;
const FALLBACK_CONFIDENCE: f64 = 0.5;

static ORDER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(\d{6,10})\b").expect("order id pattern"));
static TRACKING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:GLS|DPD)\d{8,12})\b").expect("tracking pattern"));
static PRODUCT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:termék|cikkszám)\s*#?(\d{1,8})\b").expect("product id pattern"));

#[derive(Debug, Clone, Serialize)]
pub struct IntentDecision {
    pub handler_kind: HandlerKind,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub extracted_entities: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, message: &str) -> IntentDecision {
        let lowered = message.to_lowercase();
        let entities = extract_entities(message, &lowered);

        let rules: [(HandlerKind, &[&str]); 4] = [
            (HandlerKind::Marketing, MARKETING_KEYWORDS),
            (HandlerKind::Recommendation, RECOMMENDATION_KEYWORDS),
            (HandlerKind::Order, ORDER_KEYWORDS),
            (HandlerKind::Product, PRODUCT_KEYWORDS),
        ];

        for (kind, keywords) in rules {
            let matched: Vec<String> = keywords
                .iter()
                .filter(|kw| lowered.contains(**kw))
                .map(|kw| kw.to_string())
                .collect();

            // Order intent also fires on a bare order / tracking id.
            let id_match = kind == HandlerKind::Order
                && (entities.contains_key("order_id") || entities.contains_key("tracking_number"));

            if !matched.is_empty() || id_match {
                return IntentDecision {
                    handler_kind: kind,
                    confidence: STRONG_CONFIDENCE,
                    matched_keywords: matched,
                    extracted_entities: entities,
                };
            }
        }

        IntentDecision {
            handler_kind: HandlerKind::General,
            confidence: FALLBACK_CONFIDENCE,
            matched_keywords: Vec::new(),
            extracted_entities: entities,
        }
    }
}

fn extract_entities(
    original: &str,
    lowered: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut entities = serde_json::Map::new();

    if let Some(caps) = ORDER_ID_RE.captures(original) {
        entities.insert("order_id".into(), serde_json::json!(&caps[1]));
    }
    if let Some(caps) = TRACKING_RE.captures(original) {
        entities.insert("tracking_number".into(), serde_json::json!(&caps[1]));
    }
    if let Some(caps) = PRODUCT_ID_RE.captures(lowered) {
        entities.insert("product_id".into(), serde_json::json!(&caps[1]));
    }
    if lowered.contains("telefon") {
        entities.insert("category".into(), serde_json::json!("telefon"));
    }

    entities
}

/// Order id referenced in a message, if any. Used by the order handler.
pub fn extract_order_id(message: &str) -> Option<String> {
    ORDER_ID_RE.captures(message).map(|c| c[1].to_string())
}

pub fn extract_tracking_number(message: &str) -> Option<String> {
    TRACKING_RE.captures(message).map(|c| c[1].to_string())
}
