pub mod coordinator;
pub mod model;
pub mod recovery;

pub use coordinator::{CartCoordinator, CartSource, EmailSender, MarketingConfig, SmsSender};
pub use model::AbandonedCart;
pub use recovery::RecoveryListener;
