pub mod aggregator;
pub mod classifier;
pub mod counter;
pub mod scheduler;
pub mod window;

pub use aggregator::{DailyAggregator, RebuildReport};
pub use classifier::{
    classify_connectivity, classify_fill, classify_window, remaining, Connectivity, FillStatus,
    FillThresholds,
};
pub use counter::{CountScope, Counts, GroupBy, GroupKey, GroupMode, WindowCounter};
pub use scheduler::AggregationScheduler;
pub use window::TimeWindow;
