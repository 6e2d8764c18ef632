use serde::{Deserialize, Serialize};

pub type WasteTypeId = i64;

/// Waste type catalog entry. Grouping uses the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WasteType {
    pub id: WasteTypeId,
    pub name: String,
}
