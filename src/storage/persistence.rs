//! JSON snapshots of the committed record set.

use super::RecordSet;
use crate::core::{Result, StoreError, VersionedRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSetSnapshot {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub records: Vec<VersionedRecord>,
}

impl RecordSetSnapshot {
    pub fn new(set: &RecordSet) -> Self {
        let mut records: Vec<VersionedRecord> = set.records().cloned().collect();
        records.sort_by(|a, b| {
            a.entity_type
                .cmp(&b.entity_type)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            records,
        }
    }
}

/// Writes `set` to a temp file next to `path`, then renames it into place.
pub fn save_snapshot(set: &RecordSet, path: &Path) -> Result<usize> {
    let snapshot = RecordSetSnapshot::new(set);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| StoreError::IoError(format!("Failed to rename snapshot: {}", e)))?;

    Ok(snapshot.records.len())
}

pub fn load_snapshot(path: &Path) -> Result<RecordSet> {
    let file = File::open(path)?;
    let snapshot: RecordSetSnapshot = serde_json::from_reader(BufReader::new(file))?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(StoreError::Serialization(format!(
            "unsupported snapshot format {} (expected {})",
            snapshot.format_version, SNAPSHOT_FORMAT_VERSION
        )));
    }
    Ok(RecordSet::from_records(snapshot.records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityType, Patch};
    use crate::storage::{InMemoryStorage, StorageAdapter};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_save_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");

        let storage = InMemoryStorage::new();
        let company = storage
            .create(EntityType::Company, Patch::new().set("name", "Acme"), 0)
            .await
            .unwrap();
        storage
            .write(EntityType::Company, &company.id, &Patch::new().set("industry", "Rockets"))
            .await
            .unwrap();

        assert_eq!(storage.save_snapshot(&path).await.unwrap(), 1);

        let restored = InMemoryStorage::new();
        assert_eq!(restored.restore_snapshot(&path).await.unwrap(), 1);
        let record = restored
            .read(EntityType::Company, &company.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.get("industry"), Some(&serde_json::json!("Rockets")));
    }

    #[test]
    fn test_rejects_unknown_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"{"formatVersion": 99, "createdAt": "2024-01-01T00:00:00Z", "records": []}"#,
        )
        .unwrap();

        assert!(matches!(load_snapshot(&path), Err(StoreError::Serialization(_))));
    }
}
