//! Product information handler.

use anyhow::Result;

use crate::deps::AgentDeps;
use crate::handler::{Handler, HandlerDescriptor, ToolDescriptor, failure_response};
use crate::types::{AgentResponse, HandlerKind};

const SYSTEM_PROMPT: &str = "\
Te a ChatBuddy termékinformációs asszisztense vagy. Segítesz a \
vásárlóknak termékeket találni, árakat és készletet ellenőrizni. \
Mindig magyarul válaszolj, tömören és pontosan. Ha nem találsz \
terméket, mondd meg őszintén.";

pub struct ProductHandler;

#[async_trait::async_trait]
impl Handler for ProductHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Product
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: "product_info",
            system_prompt: SYSTEM_PROMPT,
            tools: vec![
                ToolDescriptor {
                    name: "search_products",
                    description: "Termékek keresése név vagy kategória alapján",
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": { "query": { "type": "string" } },
                        "required": ["query"]
                    }),
                },
                ToolDescriptor {
                    name: "get_product_details",
                    description: "Egy termék részletes adatai azonosító alapján",
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": { "product_id": { "type": "integer" } },
                        "required": ["product_id"]
                    }),
                },
            ],
        }
    }

    async fn handle(&self, message: &str, deps: &AgentDeps) -> AgentResponse {
        match self.answer(message, deps).await {
            Ok(response) => response,
            Err(e) => failure_response(self.kind(), deps, &e),
        }
    }
}

impl ProductHandler {
    async fn answer(&self, message: &str, deps: &AgentDeps) -> Result<AgentResponse> {
        let products = deps.webshop.search_products(message).await?;

        if products.is_empty() {
            return Ok(AgentResponse::new(
                HandlerKind::Product,
                "Sajnos nem találtam a keresésnek megfelelő terméket. \
                 Próbáld meg másképp megfogalmazni, vagy nézd meg a kategóriákat!",
                0.6,
            ));
        }

        let mut lines = vec!["A következő termékeket találtam:".to_string()];
        for p in products.iter().take(5) {
            let availability = if p.in_stock() {
                format!("készleten ({} db)", p.stock)
            } else {
                "jelenleg nincs készleten".to_string()
            };
            lines.push(format!("• {} – {:.0} Ft, {}", p.name, p.price, availability));
        }

        Ok(
            AgentResponse::new(HandlerKind::Product, lines.join("\n"), 0.9)
                .with_meta("result_count", serde_json::json!(products.len())),
        )
    }
}
