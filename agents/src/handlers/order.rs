//! Order status handler.

use anyhow::Result;

use common::models::{Order, OrderStatus};

use crate::classifier::{extract_order_id, extract_tracking_number};
use crate::deps::AgentDeps;
use crate::handler::{Handler, HandlerDescriptor, ToolDescriptor, failure_response};
use crate::types::{AgentResponse, HandlerKind};

const SYSTEM_PROMPT: &str = "\
Te a ChatBuddy rendeléskövetési asszisztense vagy. Rendelési számok és \
csomagkövetési azonosítók alapján adsz tájékoztatást a rendelés \
állapotáról és a szállításról. Mindig magyarul válaszolj.";

pub struct OrderHandler;

#[async_trait::async_trait]
impl Handler for OrderHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Order
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: "order_status",
            system_prompt: SYSTEM_PROMPT,
            tools: vec![
                ToolDescriptor {
                    name: "get_order_status",
                    description: "Rendelés állapotának lekérése rendelési szám alapján",
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": { "order_id": { "type": "string" } },
                        "required": ["order_id"]
                    }),
                },
                ToolDescriptor {
                    name: "track_shipment",
                    description: "Csomag követése futárszolgálati azonosító alapján",
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": { "tracking_number": { "type": "string" } },
                        "required": ["tracking_number"]
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

impl OrderHandler {
    async fn answer(&self, message: &str, deps: &AgentDeps) -> Result<AgentResponse> {
        if let Some(order_id) = extract_order_id(message) {
            let order = deps.webshop.order_by_id(&order_id).await?;
            return Ok(match order {
                Some(order) => describe_order(&order)
                    .with_meta("order_id", serde_json::json!(order_id)),
                None => AgentResponse::new(
                    HandlerKind::Order,
                    format!(
                        "Nem találtam rendelést #{order_id} számon. \
                         Kérlek, ellenőrizd a rendelési számot!"
                    ),
                    0.7,
                ),
            });
        }

        if let Some(tracking) = extract_tracking_number(message) {
            let order = deps.webshop.order_by_tracking(&tracking).await?;
            return Ok(match order {
                Some(order) => describe_order(&order)
                    .with_meta("tracking_number", serde_json::json!(tracking)),
                None => AgentResponse::new(
                    HandlerKind::Order,
                    format!("A(z) {tracking} követési számhoz nem találtam csomagot."),
                    0.7,
                ),
            });
        }

        Ok(AgentResponse::new(
            HandlerKind::Order,
            "Szívesen megnézem a rendelésed állapotát! Kérlek, add meg a \
             rendelési számodat (pl. #1234567) vagy a csomagkövetési azonosítót.",
            0.7,
        ))
    }
}

fn describe_order(order: &Order) -> AgentResponse {
    let status_text = match order.status {
        OrderStatus::Pending => "feldolgozásra vár",
        OrderStatus::Processing => "feldolgozás alatt van",
        OrderStatus::Shipped => "átadtuk a futárszolgálatnak",
        OrderStatus::Delivered => "kézbesítettük",
        OrderStatus::Cancelled => "törölve lett",
    };

    let mut text = format!("A(z) {} számú rendelésed {}.", order.id, status_text);
    if let Some(tracking) = &order.tracking_number {
        text.push_str(&format!(" Követési szám: {tracking}."));
    }

    AgentResponse::new(HandlerKind::Order, text, 0.9)
        .with_meta("status", serde_json::json!(order.status.to_string()))
}
