pub mod containers;
pub mod dashboard;
pub mod detections;

pub use containers::ContainerService;
pub use dashboard::DashboardService;
pub use detections::DetectionService;

use crate::config::StatsConfig;
use crate::stats::{AggregationScheduler, DailyAggregator};
use crate::store::Stores;
use std::sync::Arc;

/// Every service wired over one set of stores
#[derive(Clone)]
pub struct Services {
    pub detections: DetectionService,
    pub containers: ContainerService,
    pub dashboard: DashboardService,
    pub scheduler: Arc<AggregationScheduler>,
}

impl Services {
    pub fn new(stores: Stores, stats: StatsConfig) -> Self {
        let aggregator = DailyAggregator::new(&stores);
        Self {
            detections: DetectionService::new(stores.clone()),
            containers: ContainerService::new(stores.clone()),
            dashboard: DashboardService::new(stores, aggregator.clone()),
            scheduler: Arc::new(AggregationScheduler::new(aggregator, stats)),
        }
    }
}
