pub mod analytics_cache;
pub mod enums;
pub mod error_log;
pub mod item;
pub mod snapshot;
pub mod state;
pub mod usage_counter;
pub mod worker_metrics;
