use super::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of business record held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Contact,
    Company,
    Deal,
    Activity,
    User,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Contact,
        EntityType::Company,
        EntityType::Deal,
        EntityType::Activity,
        EntityType::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Company => "company",
            EntityType::Deal => "deal",
            EntityType::Activity => "activity",
            EntityType::User => "user",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contact" | "contacts" => Ok(EntityType::Contact),
            "company" | "companies" => Ok(EntityType::Company),
            "deal" | "deals" => Ok(EntityType::Deal),
            "activity" | "activities" => Ok(EntityType::Activity),
            "user" | "users" => Ok(EntityType::User),
            other => Err(StoreError::InvalidInput(format!(
                "unknown entity type '{}'",
                other
            ))),
        }
    }
}

/// Opaque, immutable record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        RecordId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(RecordId)
            .map_err(|e| StoreError::InvalidInput(format!("invalid record id '{}': {}", s, e)))
    }
}

impl From<RecordId> for serde_json::Value {
    fn from(id: RecordId) -> Self {
        serde_json::Value::String(id.to_string())
    }
}
