use super::{EntityType, RecordId, Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by the record envelope. A patch may never assign them.
pub const RESERVED_FIELDS: [&str; 5] = ["id", "entityType", "version", "createdAt", "updatedAt"];

/// A mutable business record carrying its optimistic-lock version.
///
/// `version` counts successful mutations since creation: every update path
/// goes through [`VersionedRecord::apply_patch`], which bumps it by exactly one
/// and stamps `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord {
    pub id: RecordId,
    pub entity_type: EntityType,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl VersionedRecord {
    /// Builds a fresh record at `version`, with `created_at == updated_at == now`.
    pub fn new(
        entity_type: EntityType,
        fields: Map<String, Value>,
        version: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            entity_type,
            version,
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Reads a reference field as a record id. `null` and absent fields yield `None`.
    pub fn reference(&self, field: &str) -> Option<RecordId> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    /// Applies `patch`, advancing the version by one and stamping `now`.
    ///
    /// A record already at `u64::MAX` cannot take another write; it is left
    /// untouched and the call fails with [`StoreError::VersionOverflow`].
    pub fn apply_patch(&mut self, patch: &Patch, now: DateTime<Utc>) -> Result<()> {
        let next = self
            .version
            .checked_add(1)
            .ok_or(StoreError::VersionOverflow {
                entity: self.entity_type,
                id: self.id,
            })?;
        for (field, value) in patch.iter() {
            self.fields.insert(field.clone(), value.clone());
        }
        self.version = next;
        self.updated_at = now;
        Ok(())
    }
}

/// A set of independent field assignments.
///
/// There is no "increment by" form: reapplying the same patch against a newer
/// version yields the same field values, which is what makes `RETRY` safe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Map<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Adds a field assignment (builder style).
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Adds `field = null`.
    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), Value::Null);
        self
    }

    /// Builds a patch from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidPatch(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Rejects empty patches and patches touching envelope fields.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(StoreError::InvalidPatch("patch has no fields".into()));
        }
        self.validate_fields()
    }

    /// Like [`Patch::validate`] but accepts an empty field set (record creation).
    pub fn validate_fields(&self) -> Result<()> {
        if let Some(reserved) = self
            .0
            .keys()
            .find(|key| RESERVED_FIELDS.contains(&key.as_str()))
        {
            return Err(StoreError::InvalidPatch(format!(
                "field '{}' is managed by the store and cannot be assigned",
                reserved
            )));
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
