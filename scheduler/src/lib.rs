pub mod bus;
pub mod conflict;
pub mod engine;
pub mod types;

pub use bus::{Event, EventBus, EventHandler, EventType};
pub use engine::SyncScheduler;
pub use types::{JobConfig, JobExecutor, JobKind, JobRun};
