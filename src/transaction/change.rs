// ============================================================================
// Transaction Change Journal
// ============================================================================

use crate::core::{EntityType, RecordId, VersionedRecord};
use std::fmt;

/// One record-level mutation performed inside a transaction.
///
/// Only the identity and versions are kept: the working record set already
/// holds the data, the journal is what commit reports and rollback discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Insert {
        entity: EntityType,
        id: RecordId,
        version: u64,
    },

    Update {
        entity: EntityType,
        id: RecordId,
        from_version: u64,
        to_version: u64,
    },

    Delete {
        entity: EntityType,
        id: RecordId,
        version: u64,
    },
}

impl Change {
    pub fn insert(record: &VersionedRecord) -> Self {
        Change::Insert {
            entity: record.entity_type,
            id: record.id,
            version: record.version,
        }
    }

    pub fn update(from_version: u64, after: &VersionedRecord) -> Self {
        Change::Update {
            entity: after.entity_type,
            id: after.id,
            from_version,
            to_version: after.version,
        }
    }

    pub fn delete(record: &VersionedRecord) -> Self {
        Change::Delete {
            entity: record.entity_type,
            id: record.id,
            version: record.version,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Change::Insert { entity, .. }
            | Change::Update { entity, .. }
            | Change::Delete { entity, .. } => *entity,
        }
    }

    pub fn record_id(&self) -> RecordId {
        match self {
            Change::Insert { id, .. } | Change::Update { id, .. } | Change::Delete { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Insert { .. } => "insert",
            Change::Update { .. } => "update",
            Change::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Insert { entity, id, version } => {
                write!(f, "insert {} '{}' at v{}", entity, id, version)
            }
            Change::Update {
                entity,
                id,
                from_version,
                to_version,
            } => write!(
                f,
                "update {} '{}' v{} -> v{}",
                entity, id, from_version, to_version
            ),
            Change::Delete { entity, id, version } => {
                write!(f, "delete {} '{}' at v{}", entity, id, version)
            }
        }
    }
}
