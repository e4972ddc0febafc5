//! Marketing / promotions handler.

use anyhow::Result;

use crate::deps::AgentDeps;
use crate::handler::{Handler, HandlerDescriptor, ToolDescriptor, failure_response};
use crate::types::{AgentResponse, HandlerKind};

const SYSTEM_PROMPT: &str = "\
Te a ChatBuddy marketing asszisztense vagy. Aktuális akciókról, \
kedvezményekről és kuponokról tájékoztatod a vásárlókat. Mindig \
magyarul válaszolj, és csak valóban élő akciót említs.";

pub struct MarketingHandler;

#[async_trait::async_trait]
impl Handler for MarketingHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Marketing
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: "marketing",
            system_prompt: SYSTEM_PROMPT,
            tools: vec![ToolDescriptor {
                name: "get_active_promotions",
                description: "Éppen futó akciók és kuponok lekérése",
                parameters: serde_json::json!({ "type": "object", "properties": {} }),
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

impl MarketingHandler {
    async fn answer(&self, _message: &str, deps: &AgentDeps) -> Result<AgentResponse> {
        let promotions = deps.webshop.active_promotions().await?;

        if promotions.is_empty() {
            return Ok(AgentResponse::new(
                HandlerKind::Marketing,
                "Jelenleg nincs futó akciónk, de hamarosan érkeznek új \
                 kedvezmények. Iratkozz fel a hírlevelünkre, hogy elsőként értesülj!",
                0.8,
            ));
        }

        let mut lines = vec!["Ezek az akciók futnak most:".to_string()];
        for p in &promotions {
            lines.push(format!(
                "• {} – {:.0}% kedvezmény (kupon: {})",
                p.description, p.discount_percent, p.code
            ));
        }

        Ok(
            AgentResponse::new(HandlerKind::Marketing, lines.join("\n"), 0.9)
                .with_meta("promotion_count", serde_json::json!(promotions.len())),
        )
    }
}
