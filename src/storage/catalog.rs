use crate::core::EntityType;
use std::collections::HashMap;
use std::sync::Arc;

/// A nullable foreign key: `field` holds the id of a `target` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub field: String,
    pub target: EntityType,
}

/// Constraints the engine enforces for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySchema {
    pub unique: Vec<String>,
    pub references: Vec<Reference>,
}

/// Constraint metadata for every entity type.
///
/// Immutable once built, so it is shared between the engine and its
/// transactions without locking. Builders return a new `Catalog`
/// (copy-on-write).
#[derive(Debug, Clone)]
pub struct Catalog {
    schemas: Arc<HashMap<EntityType, EntitySchema>>,
}

impl Catalog {
    /// No constraints at all.
    pub fn empty() -> Self {
        Self {
            schemas: Arc::new(HashMap::new()),
        }
    }

    /// The CRM relationship graph: contacts belong to companies, deals and
    /// activities hang off contacts, everything can have an owning user.
    pub fn crm() -> Self {
        use EntityType::*;

        Self::empty()
            .with_unique(Contact, "email")
            .with_unique(Company, "name")
            .with_unique(User, "email")
            .with_reference(Contact, "companyId", Company)
            .with_reference(Contact, "ownerId", User)
            .with_reference(Deal, "contactId", Contact)
            .with_reference(Deal, "companyId", Company)
            .with_reference(Deal, "ownerId", User)
            .with_reference(Activity, "contactId", Contact)
            .with_reference(Activity, "dealId", Deal)
            .with_reference(Activity, "ownerId", User)
    }

    pub fn with_unique(self, entity: EntityType, field: impl Into<String>) -> Self {
        let field = field.into();
        self.modify(entity, |schema| {
            if !schema.unique.contains(&field) {
                schema.unique.push(field);
            }
        })
    }

    pub fn with_reference(
        self,
        entity: EntityType,
        field: impl Into<String>,
        target: EntityType,
    ) -> Self {
        let reference = Reference {
            field: field.into(),
            target,
        };
        self.modify(entity, |schema| {
            schema.references.retain(|r| r.field != reference.field);
            schema.references.push(reference);
        })
    }

    fn modify(self, entity: EntityType, f: impl FnOnce(&mut EntitySchema)) -> Self {
        let mut schemas = (*self.schemas).clone();
        f(schemas.entry(entity).or_default());
        Self {
            schemas: Arc::new(schemas),
        }
    }

    pub fn schema(&self, entity: EntityType) -> Option<&EntitySchema> {
        self.schemas.get(&entity)
    }

    pub fn unique_fields(&self, entity: EntityType) -> &[String] {
        self.schema(entity)
            .map(|s| s.unique.as_slice())
            .unwrap_or_default()
    }

    pub fn references(&self, entity: EntityType) -> &[Reference] {
        self.schema(entity)
            .map(|s| s.references.as_slice())
            .unwrap_or_default()
    }

    /// Every `(entity, reference)` pair pointing at `target`.
    pub fn referencing(&self, target: EntityType) -> Vec<(EntityType, &Reference)> {
        let mut found: Vec<_> = self
            .schemas
            .iter()
            .flat_map(|(entity, schema)| {
                schema
                    .references
                    .iter()
                    .filter(move |r| r.target == target)
                    .map(move |r| (*entity, r))
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.field.cmp(&b.1.field)));
        found
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::crm()
    }
}
