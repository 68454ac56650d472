use crate::core::{EntityType, Patch, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a version-checked write reacts when the stored version moved on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolutionStrategy {
    /// Reject with `CONFLICT`; nothing is written.
    #[default]
    Fail,
    /// Re-read the current version and reapply the patch, up to the retry bound.
    Retry,
    /// Last writer wins: skip the version check, still bump the version.
    Overwrite,
}

impl fmt::Display for ConflictResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fail => "FAIL",
            Self::Retry => "RETRY",
            Self::Overwrite => "OVERWRITE",
        };
        f.write_str(label)
    }
}

impl FromStr for ConflictResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FAIL" => Ok(Self::Fail),
            "RETRY" => Ok(Self::Retry),
            "OVERWRITE" => Ok(Self::Overwrite),
            other => Err(format!(
                "unknown strategy '{}' (expected FAIL, RETRY or OVERWRITE)",
                other
            )),
        }
    }
}

/// One intended mutation, carrying the caller's belief about the current version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlan {
    pub entity_type: EntityType,
    pub id: RecordId,
    pub expected_version: u64,
    pub patch: Patch,
}

impl UpdatePlan {
    pub fn new(entity_type: EntityType, id: RecordId, expected_version: u64, patch: Patch) -> Self {
        Self {
            entity_type,
            id,
            expected_version,
            patch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("retry".parse::<ConflictResolutionStrategy>(), Ok(ConflictResolutionStrategy::Retry));
        assert_eq!(ConflictResolutionStrategy::Overwrite.to_string(), "OVERWRITE");
        assert!("merge".parse::<ConflictResolutionStrategy>().is_err());
        assert_eq!(ConflictResolutionStrategy::default(), ConflictResolutionStrategy::Fail);
    }

    #[test]
    fn test_update_plan_wire_shape() {
        let plan = UpdatePlan::new(
            EntityType::Deal,
            RecordId::new(),
            2,
            Patch::new().set("stage", "won"),
        );
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["entityType"], "deal");
        assert_eq!(value["expectedVersion"], 2);
        assert_eq!(value["patch"]["stage"], "won");
    }
}
