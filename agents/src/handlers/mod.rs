pub mod general;
pub mod marketing;
pub mod order;
pub mod product;
pub mod recommendation;

pub use general::GeneralHandler;
pub use marketing::MarketingHandler;
pub use order::OrderHandler;
pub use product::ProductHandler;
pub use recommendation::RecommendationHandler;
