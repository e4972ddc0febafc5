pub mod classifier;
pub mod deps;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod types;

pub use classifier::{IntentClassifier, IntentDecision};
pub use deps::AgentDeps;
pub use handler::{Handler, HandlerDescriptor, ToolDescriptor};
pub use registry::HandlerRegistry;
pub use router::{Router, RouterConfig};
pub use types::{AgentResponse, HandlerKind};
