use super::{RecordId, VersionedRecord};
use serde_json::Value;

/// Equality filter used by bulk mutations and lookups.
///
/// All conditions must hold. The pseudo-field `id` matches the record id.
/// An empty filter matches every record of the entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_eq(field, value)
    }

    pub fn by_id(id: RecordId) -> Self {
        Self::eq("id", id)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, record: &VersionedRecord) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            if field == "id" {
                return same_value(&Value::from(record.id), expected);
            }
            match record.get(field) {
                Some(actual) => same_value(actual, expected),
                // An absent field compares equal to null.
                None => expected.is_null(),
            }
        })
    }
}

/// JSON equality, except that two strings naming the same record id match
/// whatever their spelling.
fn same_value(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(b)) => matches!(
            (a.parse::<RecordId>(), b.parse::<RecordId>()),
            (Ok(a), Ok(b)) if a == b
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityType, Patch};
    use chrono::Utc;
    use serde_json::{Map, json};

    fn deal(contact: Option<RecordId>) -> VersionedRecord {
        let mut record = VersionedRecord::new(EntityType::Deal, Map::new(), 0, Utc::now());
        let patch = match contact {
            Some(id) => Patch::new().set("contactId", id),
            None => Patch::new().clear("contactId"),
        };
        record.apply_patch(&patch, Utc::now()).unwrap();
        record
    }

    #[test]
    fn test_filter_matches_reference_field() {
        let contact = RecordId::new();
        let linked = deal(Some(contact));
        let unlinked = deal(None);

        let filter = Filter::eq("contactId", contact);
        assert!(filter.matches(&linked));
        assert!(!filter.matches(&unlinked));
    }

    #[test]
    fn test_filter_matches_ids_by_value() {
        let contact = RecordId::new();
        let linked = deal(Some(contact));

        let shouted = contact.to_string().to_uppercase();
        assert!(Filter::eq("contactId", shouted.as_str()).matches(&linked));
        assert!(Filter::by_id(linked.id).matches(&linked));
        assert!(Filter::eq("id", linked.id.to_string().to_uppercase()).matches(&linked));
        assert!(!Filter::eq("contactId", RecordId::new()).matches(&linked));
    }

    #[test]
    fn test_filter_by_id_and_null_semantics() {
        let record = deal(None);
        assert!(Filter::by_id(record.id).matches(&record));
        assert!(Filter::eq("stage", json!(null)).matches(&record));
        assert!(Filter::all().matches(&record));
        assert!(!Filter::eq("stage", "won").matches(&record));
    }
}
