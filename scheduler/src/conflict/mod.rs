pub mod monitor;
pub mod resolver;
pub mod types;

pub use monitor::{ConflictMonitor, ScanReport};
pub use resolver::{
    ConflictResolver, detect_category_mismatch, detect_data_integrity_issues,
    detect_duplicate_products, detect_price_conflict, detect_stock_conflict,
};
pub use types::{Conflict, ConflictStats, ConflictType, ResolutionRecord, ResolutionStrategy, Severity};
