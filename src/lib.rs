pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod services;
pub mod stats;
pub mod store;

// Re-export main components for easier use
pub use error::Error;
pub use services::Services;
pub use stats::{AggregationScheduler, DailyAggregator, FillStatus, TimeWindow, WindowCounter};
pub use store::Stores;
