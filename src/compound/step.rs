use crate::core::{EntityType, Filter, Patch, RecordId};
use std::fmt;

/// A single storage mutation inside a compound operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    UpdateMany {
        entity: EntityType,
        filter: Filter,
        patch: Patch,
    },
    DeleteMany {
        entity: EntityType,
        filter: Filter,
    },
    /// Fails with `NOT_FOUND` when the record is absent.
    DeleteOne { entity: EntityType, id: RecordId },
    Create { entity: EntityType, fields: Patch },
}

impl StepKind {
    pub fn entity_type(&self) -> EntityType {
        match self {
            StepKind::UpdateMany { entity, .. }
            | StepKind::DeleteMany { entity, .. }
            | StepKind::DeleteOne { entity, .. }
            | StepKind::Create { entity, .. } => *entity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::UpdateMany { .. } => "update_many",
            StepKind::DeleteMany { .. } => "delete_many",
            StepKind::DeleteOne { .. } => "delete_one",
            StepKind::Create { .. } => "create",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundStep {
    pub label: String,
    pub kind: StepKind,
}

impl fmt::Display for CompoundStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.label, self.kind.name(), self.kind.entity_type())
    }
}

/// An ordered list of steps committed or rolled back as one unit.
///
/// ```
/// use crmstore::compound::CompoundOperation;
/// use crmstore::core::{EntityType, Filter, Patch, RecordId};
///
/// let contact = RecordId::new();
/// let op = CompoundOperation::new("archive_contact")
///     .update_many(
///         "unlink deals",
///         EntityType::Deal,
///         Filter::eq("contactId", contact),
///         Patch::new().clear("contactId"),
///     )
///     .delete_one("delete contact", EntityType::Contact, contact);
/// assert_eq!(op.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundOperation {
    name: String,
    steps: Vec<CompoundStep>,
}

impl CompoundOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, label: impl Into<String>, kind: StepKind) -> Self {
        self.steps.push(CompoundStep {
            label: label.into(),
            kind,
        });
        self
    }

    pub fn update_many(
        self,
        label: impl Into<String>,
        entity: EntityType,
        filter: Filter,
        patch: Patch,
    ) -> Self {
        self.step(
            label,
            StepKind::UpdateMany {
                entity,
                filter,
                patch,
            },
        )
    }

    pub fn delete_many(self, label: impl Into<String>, entity: EntityType, filter: Filter) -> Self {
        self.step(label, StepKind::DeleteMany { entity, filter })
    }

    pub fn delete_one(self, label: impl Into<String>, entity: EntityType, id: RecordId) -> Self {
        self.step(label, StepKind::DeleteOne { entity, id })
    }

    pub fn create(self, label: impl Into<String>, entity: EntityType, fields: Patch) -> Self {
        self.step(label, StepKind::Create { entity, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[CompoundStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
