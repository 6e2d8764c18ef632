use super::container_models::CityKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pre-aggregated detection count keyed by (date, city, waste type)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DailyStat {
    pub stats_date: NaiveDate,
    pub city: CityKey,
    pub waste_type: String,
    pub detection_count: i64,
}

impl DailyStat {
    pub fn key(&self) -> (NaiveDate, CityKey, String) {
        (self.stats_date, self.city.clone(), self.waste_type.clone())
    }
}

/// Database row for `daily_stats`; city is stored as text with the UNKNOWN label
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyStatDb {
    pub stats_date: NaiveDate,
    pub city: String,
    pub waste_type: String,
    pub detection_count: i64,
}

impl From<DailyStatDb> for DailyStat {
    fn from(db: DailyStatDb) -> Self {
        Self {
            stats_date: db.stats_date,
            city: CityKey::from(db.city),
            waste_type: db.waste_type,
            detection_count: db.detection_count,
        }
    }
}

impl From<DailyStat> for DailyStatDb {
    fn from(stat: DailyStat) -> Self {
        Self {
            stats_date: stat.stats_date,
            city: stat.city.into(),
            waste_type: stat.waste_type,
            detection_count: stat.detection_count,
        }
    }
}
