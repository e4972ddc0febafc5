use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag identifying one of the five specialized handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Product,
    Order,
    Recommendation,
    Marketing,
    General,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Product => "product",
            HandlerKind::Order => "order",
            HandlerKind::Recommendation => "recommendation",
            HandlerKind::Marketing => "marketing",
            HandlerKind::General => "general",
        }
    }

    pub const ALL: [HandlerKind; 5] = [
        HandlerKind::Product,
        HandlerKind::Order,
        HandlerKind::Recommendation,
        HandlerKind::Marketing,
        HandlerKind::General,
    ];
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(HandlerKind::Product),
            "order" => Ok(HandlerKind::Order),
            "recommendation" => Ok(HandlerKind::Recommendation),
            "marketing" => Ok(HandlerKind::Marketing),
            "general" => Ok(HandlerKind::General),
            other => Err(anyhow::anyhow!("invalid handler kind: {}", other)),
        }
    }
}

/// The one response produced for an inbound turn. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub text: String,
    pub confidence: f64,
    pub handler_kind: HandlerKind,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn new(handler_kind: HandlerKind, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            handler_kind,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Active discount campaign exposed by the webshop collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub code: String,
    pub description: String,
    pub discount_percent: f64,
    pub valid_until: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_kind_round_trips_through_str() {
        for kind in HandlerKind::ALL {
            assert_eq!(kind.as_str().parse::<HandlerKind>().unwrap(), kind);
        }
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(AgentResponse::new(HandlerKind::General, "x", 1.7).confidence, 1.0);
        assert_eq!(AgentResponse::new(HandlerKind::General, "x", -0.2).confidence, 0.0);
    }
}
