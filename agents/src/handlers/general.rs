//! General / fallback handler.

use crate::deps::AgentDeps;
use crate::handler::{Handler, HandlerDescriptor};
use crate::types::{AgentResponse, HandlerKind};

const SYSTEM_PROMPT: &str = "\
Te a ChatBuddy általános asszisztense vagy. Udvariasan segítesz a \
webshoppal kapcsolatos általános kérdésekben, és jelzed, miben tudsz \
segíteni. Mindig magyarul válaszolj.";

pub struct GeneralHandler;

#[async_trait::async_trait]
impl Handler for GeneralHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::General
    }

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: "general",
            system_prompt: SYSTEM_PROMPT,
            tools: Vec::new(),
        }
    }

    async fn handle(&self, _message: &str, _deps: &AgentDeps) -> AgentResponse {
        AgentResponse::new(
            HandlerKind::General,
            "Szia! Miben segíthetek? Kérdezhetsz termékekről, rendelésed \
             állapotáról, vagy megnézhetem az aktuális akciókat is.",
            0.8,
        )
    }
}
