use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::{Handler, HandlerDescriptor};
use crate::handlers::{
    GeneralHandler, MarketingHandler, OrderHandler, ProductHandler, RecommendationHandler,
};
use crate::types::HandlerKind;

/// Kind → handler table. Exactly one handler per kind; registering a
/// kind twice replaces the previous handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKind, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the five built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ProductHandler));
        registry.register(Arc::new(OrderHandler));
        registry.register(Arc::new(RecommendationHandler));
        registry.register(Arc::new(MarketingHandler));
        registry.register(Arc::new(GeneralHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: HandlerKind) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn has(&self, kind: HandlerKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Descriptors for the LLM layer, in kind order.
    pub fn descriptors(&self) -> Vec<(HandlerKind, HandlerDescriptor)> {
        HandlerKind::ALL
            .iter()
            .filter_map(|kind| self.handlers.get(kind).map(|h| (*kind, h.descriptor())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::AgentDeps;
    use crate::types::AgentResponse;

    struct StubHandler(HandlerKind, f64);

    #[async_trait::async_trait]
    impl Handler for StubHandler {
        fn kind(&self) -> HandlerKind {
            self.0
        }

        fn descriptor(&self) -> HandlerDescriptor {
            HandlerDescriptor {
                name: "stub",
                system_prompt: "",
                tools: Vec::new(),
            }
        }

        async fn handle(&self, _message: &str, _deps: &AgentDeps) -> AgentResponse {
            AgentResponse::new(self.0, "stub", self.1)
        }
    }

    #[test]
    fn defaults_cover_every_kind() {
        let registry = HandlerRegistry::with_defaults();
        for kind in HandlerKind::ALL {
            assert!(registry.has(kind), "missing handler for {kind}");
        }
        assert_eq!(registry.descriptors().len(), 5);
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(StubHandler(HandlerKind::Product, 0.1)));
        registry.register(Arc::new(StubHandler(HandlerKind::Product, 0.2)));

        assert!(registry.has(HandlerKind::Product));
        assert_eq!(registry.descriptors().len(), 1);
    }
}
