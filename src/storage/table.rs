use super::Catalog;
use super::engine::WriteOutcome;
use crate::core::{EntityType, Filter, Patch, RecordId, Result, StoreError, VersionedRecord};
use crate::transaction::Change;
use chrono::{DateTime, Utc};

/// All records of one entity type.
///
/// Backed by a persistent map so a whole [`RecordSet`] clones in O(1); that
/// is what lets a transaction work on a private copy of the data.
#[derive(Debug, Clone, Default)]
pub struct Table {
    records: im::HashMap<RecordId, VersionedRecord>,
}

impl Table {
    pub fn get(&self, id: &RecordId) -> Option<&VersionedRecord> {
        self.records.get(id)
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionedRecord> {
        self.records.values()
    }

    /// Matching records in creation order.
    pub fn scan(&self, filter: &Filter) -> Vec<VersionedRecord> {
        let mut rows: Vec<VersionedRecord> = self
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }
}

/// The full record set: one [`Table`] per entity type.
///
/// Every mutation enforces the catalog's unique and reference constraints and
/// journals a [`Change`]. A failed mutation leaves the set untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    tables: im::HashMap<EntityType, Table>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads records without constraint checks (snapshot restore).
    pub fn from_records(records: impl IntoIterator<Item = VersionedRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.table_mut(record.entity_type)
                .records
                .insert(record.id, record);
        }
        set
    }

    pub fn table(&self, entity: EntityType) -> Option<&Table> {
        self.tables.get(&entity)
    }

    fn table_mut(&mut self, entity: EntityType) -> &mut Table {
        self.tables.entry(entity).or_insert_with(Table::default)
    }

    pub fn get(&self, entity: EntityType, id: &RecordId) -> Option<&VersionedRecord> {
        self.table(entity).and_then(|t| t.get(id))
    }

    pub fn scan(&self, entity: EntityType, filter: &Filter) -> Vec<VersionedRecord> {
        self.table(entity)
            .map(|t| t.scan(filter))
            .unwrap_or_default()
    }

    pub fn row_count(&self, entity: EntityType) -> usize {
        self.table(entity).map(Table::row_count).unwrap_or(0)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Table::row_count).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &VersionedRecord> {
        self.tables.values().flat_map(Table::iter)
    }

    pub fn insert(
        &mut self,
        catalog: &Catalog,
        record: VersionedRecord,
        journal: &mut Vec<Change>,
    ) -> Result<VersionedRecord> {
        let mut record = record;
        self.check_unique(catalog, &record)?;
        self.resolve_references(catalog, &mut record)?;

        self.table_mut(record.entity_type)
            .records
            .insert(record.id, record.clone());
        journal.push(Change::insert(&record));
        Ok(record)
    }

    /// Applies `patch` to one record.
    ///
    /// With `expected_version` set this is the compare-and-swap: a missing
    /// record or a different stored version affects zero rows. Without it the
    /// write is unconditional. Either way a successful write bumps the version
    /// by one.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        catalog: &Catalog,
        entity: EntityType,
        id: &RecordId,
        expected_version: Option<u64>,
        patch: &Patch,
        now: DateTime<Utc>,
        journal: &mut Vec<Change>,
    ) -> Result<WriteOutcome> {
        let Some(current) = self.get(entity, id) else {
            return Ok(WriteOutcome::missed());
        };

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Ok(WriteOutcome::missed());
            }
        }

        let from_version = current.version;
        let mut after = current.clone();
        after.apply_patch(patch, now)?;
        self.check_unique(catalog, &after)?;
        self.resolve_references(catalog, &mut after)?;

        self.table_mut(entity).records.insert(after.id, after.clone());
        journal.push(Change::update(from_version, &after));
        Ok(WriteOutcome::applied(after))
    }

    pub fn update_many(
        &mut self,
        catalog: &Catalog,
        entity: EntityType,
        filter: &Filter,
        patch: &Patch,
        now: DateTime<Utc>,
        journal: &mut Vec<Change>,
    ) -> Result<u64> {
        let mut affected = 0u64;
        for record in self.scan(entity, filter) {
            let outcome = self.update(catalog, entity, &record.id, None, patch, now, journal)?;
            affected += outcome.rows_affected;
        }
        Ok(affected)
    }

    /// Removes one record. Fails if another record still references it.
    pub fn delete(
        &mut self,
        catalog: &Catalog,
        entity: EntityType,
        id: &RecordId,
        journal: &mut Vec<Change>,
    ) -> Result<Option<VersionedRecord>> {
        if self.get(entity, id).is_none() {
            return Ok(None);
        }
        self.check_not_referenced(catalog, entity, id)?;

        let removed = self.table_mut(entity).records.remove(id);
        if let Some(record) = &removed {
            journal.push(Change::delete(record));
        }
        Ok(removed)
    }

    pub fn delete_many(
        &mut self,
        catalog: &Catalog,
        entity: EntityType,
        filter: &Filter,
        journal: &mut Vec<Change>,
    ) -> Result<u64> {
        let mut affected = 0u64;
        for record in self.scan(entity, filter) {
            if self.delete(catalog, entity, &record.id, journal)?.is_some() {
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn check_unique(&self, catalog: &Catalog, record: &VersionedRecord) -> Result<()> {
        let Some(table) = self.table(record.entity_type) else {
            return Ok(());
        };

        for field in catalog.unique_fields(record.entity_type) {
            let Some(value) = record.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(existing) = table
                .iter()
                .find(|other| other.id != record.id && other.get(field) == Some(value))
            {
                return Err(StoreError::UniqueViolation {
                    entity: record.entity_type,
                    field: field.clone(),
                    value: value.to_string(),
                    existing: existing.id,
                });
            }
        }
        Ok(())
    }

    /// Checks every non-null reference points at an existing record and
    /// rewrites it to the canonical id spelling, so equality filters and the
    /// delete restriction see one form per id.
    fn resolve_references(&self, catalog: &Catalog, record: &mut VersionedRecord) -> Result<()> {
        let entity = record.entity_type;
        for reference in catalog.references(entity) {
            let Some(value) = record
                .fields
                .get_mut(&reference.field)
                .filter(|v| !v.is_null())
            else {
                continue;
            };
            let target_id: RecordId = value
                .as_str()
                .ok_or_else(|| {
                    StoreError::InvalidInput(format!(
                        "{}.{} must be a record id string, got {}",
                        entity, reference.field, value
                    ))
                })?
                .parse()?;

            if self.get(reference.target, &target_id).is_none() {
                return Err(StoreError::ForeignKeyViolation {
                    entity,
                    field: reference.field.clone(),
                    detail: format!("{} '{}' does not exist", reference.target, target_id),
                });
            }
            *value = serde_json::Value::from(target_id);
        }
        Ok(())
    }

    fn check_not_referenced(
        &self,
        catalog: &Catalog,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<()> {
        for (source, reference) in catalog.referencing(entity) {
            let Some(table) = self.table(source) else {
                continue;
            };
            // Compared as ids: snapshot loads skip canonicalization.
            if let Some(dependent) = table
                .iter()
                .find(|r| r.reference(&reference.field) == Some(*id))
            {
                return Err(StoreError::ForeignKeyViolation {
                    entity: source,
                    field: reference.field.clone(),
                    detail: format!(
                        "{} '{}' is still referenced by {} '{}'",
                        entity, id, source, dependent.id
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn record(entity: EntityType, fields: serde_json::Value) -> VersionedRecord {
        let fields: Map<String, serde_json::Value> = match fields {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        VersionedRecord::new(entity, fields, 0, Utc::now())
    }

    #[test]
    fn test_conditional_update_requires_matching_version() {
        let catalog = Catalog::crm();
        let mut set = RecordSet::new();
        let mut journal = Vec::new();
        let contact = set
            .insert(&catalog, record(EntityType::Contact, json!({"firstName": "Ada"})), &mut journal)
            .unwrap();

        let patch = Patch::new().set("jobTitle", "CTO");
        let stale = set
            .update(&catalog, EntityType::Contact, &contact.id, Some(7), &patch, Utc::now(), &mut journal)
            .unwrap();
        assert_eq!(stale.rows_affected, 0);
        assert_eq!(set.get(EntityType::Contact, &contact.id).unwrap().version, 0);

        let fresh = set
            .update(&catalog, EntityType::Contact, &contact.id, Some(0), &patch, Utc::now(), &mut journal)
            .unwrap();
        assert_eq!(fresh.rows_affected, 1);
        assert_eq!(fresh.record.unwrap().version, 1);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_unique_violation_leaves_set_untouched() {
        let catalog = Catalog::crm();
        let mut set = RecordSet::new();
        let mut journal = Vec::new();
        set.insert(&catalog, record(EntityType::Contact, json!({"email": "a@x.io"})), &mut journal)
            .unwrap();

        let err = set
            .insert(&catalog, record(EntityType::Contact, json!({"email": "a@x.io"})), &mut journal)
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "email"));
        assert_eq!(set.row_count(EntityType::Contact), 1);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let catalog = Catalog::crm();
        let mut set = RecordSet::new();
        let mut journal = Vec::new();

        let err = set
            .insert(
                &catalog,
                record(EntityType::Deal, json!({"contactId": RecordId::new().to_string()})),
                &mut journal,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }

    #[test]
    fn test_delete_restricted_while_referenced() {
        let catalog = Catalog::crm();
        let mut set = RecordSet::new();
        let mut journal = Vec::new();
        let contact = set
            .insert(&catalog, record(EntityType::Contact, json!({})), &mut journal)
            .unwrap();
        set.insert(
            &catalog,
            record(EntityType::Deal, json!({"contactId": contact.id.to_string()})),
            &mut journal,
        )
        .unwrap();

        let err = set
            .delete(&catalog, EntityType::Contact, &contact.id, &mut journal)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: EntityType::Deal, .. }));

        let unlinked = set
            .update_many(
                &catalog,
                EntityType::Deal,
                &Filter::eq("contactId", contact.id),
                &Patch::new().clear("contactId"),
                Utc::now(),
                &mut journal,
            )
            .unwrap();
        assert_eq!(unlinked, 1);

        let removed = set
            .delete(&catalog, EntityType::Contact, &contact.id, &mut journal)
            .unwrap();
        assert!(removed.is_some());
        assert_eq!(set.row_count(EntityType::Contact), 0);
    }

    #[test]
    fn test_references_stored_in_canonical_form() {
        let catalog = Catalog::crm();
        let mut set = RecordSet::new();
        let mut journal = Vec::new();
        let contact = set
            .insert(&catalog, record(EntityType::Contact, json!({})), &mut journal)
            .unwrap();
        let shouted = contact.id.to_string().to_uppercase();

        let deal = set
            .insert(&catalog, record(EntityType::Deal, json!({"contactId": shouted})), &mut journal)
            .unwrap();
        assert_eq!(deal.get("contactId"), Some(&json!(contact.id.to_string())));

        let moved = set
            .update(
                &catalog,
                EntityType::Deal,
                &deal.id,
                None,
                &Patch::new().set("contactId", format!("{{{}}}", contact.id)),
                Utc::now(),
                &mut journal,
            )
            .unwrap();
        let stored = moved.record.unwrap();
        assert_eq!(stored.get("contactId"), Some(&json!(contact.id.to_string())));
        assert_eq!(
            set.scan(EntityType::Deal, &Filter::eq("contactId", contact.id)).len(),
            1
        );
    }

    #[test]
    fn test_delete_restricted_for_any_id_spelling() {
        let catalog = Catalog::crm();
        let contact = record(EntityType::Contact, json!({}));
        let deal = record(
            EntityType::Deal,
            json!({"contactId": contact.id.to_string().to_uppercase()}),
        );
        let mut set = RecordSet::from_records([contact.clone(), deal]);
        let mut journal = Vec::new();

        let err = set
            .delete(&catalog, EntityType::Contact, &contact.id, &mut journal)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { entity: EntityType::Deal, .. }));
        assert_eq!(set.row_count(EntityType::Contact), 1);
    }

    #[test]
    fn test_update_at_max_version_is_rejected() {
        let catalog = Catalog::crm();
        let exhausted = VersionedRecord::new(EntityType::Company, serde_json::Map::new(), u64::MAX, Utc::now());
        let mut set = RecordSet::from_records([exhausted.clone()]);
        let mut journal = Vec::new();

        let err = set
            .update(
                &catalog,
                EntityType::Company,
                &exhausted.id,
                Some(u64::MAX),
                &Patch::new().set("name", "Acme"),
                Utc::now(),
                &mut journal,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionOverflow { .. }));
        assert_eq!(set.get(EntityType::Company, &exhausted.id), Some(&exhausted));
        assert!(journal.is_empty());
    }

    #[test]
    fn test_clone_is_isolated() {
        let catalog = Catalog::crm();
        let mut set = RecordSet::new();
        let mut journal = Vec::new();
        set.insert(&catalog, record(EntityType::Company, json!({"name": "Acme"})), &mut journal)
            .unwrap();

        let mut working = set.clone();
        working
            .delete_many(&catalog, EntityType::Company, &Filter::all(), &mut journal)
            .unwrap();

        assert_eq!(working.row_count(EntityType::Company), 0);
        assert_eq!(set.row_count(EntityType::Company), 1);
    }
}
