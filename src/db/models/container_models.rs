use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ContainerId = i64;

/// Label used wherever a city or container is not known
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Container a detection event belongs to.
///
/// Events reported without a container id land in the `Unknown` bucket. In SQL
/// this is a nullable foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<ContainerId>", into = "Option<ContainerId>")]
pub enum ContainerRef {
    Known(ContainerId),
    Unknown,
}

impl ContainerRef {
    pub fn id(&self) -> Option<ContainerId> {
        match self {
            ContainerRef::Known(id) => Some(*id),
            ContainerRef::Unknown => None,
        }
    }
}

impl From<Option<ContainerId>> for ContainerRef {
    fn from(id: Option<ContainerId>) -> Self {
        match id {
            Some(id) => ContainerRef::Known(id),
            None => ContainerRef::Unknown,
        }
    }
}

impl From<ContainerRef> for Option<ContainerId> {
    fn from(container: ContainerRef) -> Self {
        container.id()
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRef::Known(id) => write!(f, "{}", id),
            ContainerRef::Unknown => f.write_str(UNKNOWN_LABEL),
        }
    }
}

/// City grouping key. Blank or missing cities group under `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CityKey {
    Known(String),
    Unknown,
}

impl CityKey {
    pub fn from_raw(city: Option<&str>) -> Self {
        match city.map(str::trim) {
            Some(city) if !city.is_empty() && city != UNKNOWN_LABEL => {
                CityKey::Known(city.to_string())
            }
            _ => CityKey::Unknown,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CityKey::Known(city) => city,
            CityKey::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CityKey::Unknown)
    }
}

impl From<String> for CityKey {
    fn from(city: String) -> Self {
        CityKey::from_raw(Some(&city))
    }
}

impl From<&str> for CityKey {
    fn from(city: &str) -> Self {
        CityKey::from_raw(Some(city))
    }
}

impl From<CityKey> for String {
    fn from(city: CityKey) -> Self {
        match city {
            CityKey::Known(city) => city,
            CityKey::Unknown => UNKNOWN_LABEL.to_string(),
        }
    }
}

impl fmt::Display for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub city: Option<String>,
    pub address_detail: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Positive when known; only used for remaining headroom
    pub capacity: Option<i64>,
    pub is_online: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl Container {
    pub fn city_key(&self) -> CityKey {
        CityKey::from_raw(self.city.as_deref())
    }

    /// Placeholder record created when a detector reports an unregistered id
    pub fn placeholder(id: ContainerId) -> Self {
        Self {
            id,
            name: format!("Container {}", id),
            city: None,
            address_detail: None,
            latitude: None,
            longitude: None,
            capacity: None,
            is_online: false,
            last_connected_at: None,
            is_deleted: false,
        }
    }
}

/// Registration payload for a container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContainer {
    pub name: String,
    pub city: Option<String>,
    pub address_detail: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    #[serde(default)]
    pub is_online: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
}
