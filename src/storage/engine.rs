use crate::core::{EntityType, Filter, Patch, RecordId, Result, VersionedRecord};
use crate::transaction::TransactionId;
use async_trait::async_trait;

/// Result of a single-record write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// `1` when the write applied, `0` when its precondition did not hold.
    pub rows_affected: u64,
    /// The record as stored after the write.
    pub record: Option<VersionedRecord>,
}

impl WriteOutcome {
    pub fn applied(record: VersionedRecord) -> Self {
        Self {
            rows_affected: 1,
            record: Some(record),
        }
    }

    pub fn missed() -> Self {
        Self {
            rows_affected: 0,
            record: None,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.rows_affected > 0
    }
}

/// Storage backend consumed by the record store.
///
/// Requirements on implementors:
/// - `conditional_write` is a single atomic compare-and-swap on
///   `(id, version)`, never a read followed by a write;
/// - transactions expose no partial state to other callers, and a
///   transaction dropped without `commit` is rolled back;
/// - unique-constraint violations surface as
///   [`StoreError::UniqueViolation`](crate::core::StoreError::UniqueViolation).
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    type Tx: StorageTransaction;

    async fn read(&self, entity: EntityType, id: &RecordId) -> Result<Option<VersionedRecord>>;

    async fn find(&self, entity: EntityType, filter: &Filter) -> Result<Vec<VersionedRecord>>;

    /// Inserts a new record whose version starts at `initial_version`.
    async fn create(
        &self,
        entity: EntityType,
        fields: Patch,
        initial_version: u64,
    ) -> Result<VersionedRecord>;

    /// Writes `patch` only if the stored version equals `expected_version`.
    async fn conditional_write(
        &self,
        entity: EntityType,
        id: &RecordId,
        expected_version: u64,
        patch: &Patch,
    ) -> Result<WriteOutcome>;

    /// Writes `patch` whatever the stored version is.
    async fn write(&self, entity: EntityType, id: &RecordId, patch: &Patch)
    -> Result<WriteOutcome>;

    async fn begin_transaction(&self) -> Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}

/// Mutations available inside an open transaction.
///
/// Reads observe the transaction's own writes.
#[async_trait]
pub trait StorageTransaction: Send {
    fn id(&self) -> TransactionId;

    /// Number of record-level changes made so far.
    fn change_count(&self) -> usize;

    async fn read(&mut self, entity: EntityType, id: &RecordId) -> Result<Option<VersionedRecord>>;

    async fn find(&mut self, entity: EntityType, filter: &Filter) -> Result<Vec<VersionedRecord>>;

    async fn create(
        &mut self,
        entity: EntityType,
        fields: Patch,
        initial_version: u64,
    ) -> Result<VersionedRecord>;

    async fn conditional_write(
        &mut self,
        entity: EntityType,
        id: &RecordId,
        expected_version: u64,
        patch: &Patch,
    ) -> Result<WriteOutcome>;

    async fn write(
        &mut self,
        entity: EntityType,
        id: &RecordId,
        patch: &Patch,
    ) -> Result<WriteOutcome>;

    async fn update_many(&mut self, entity: EntityType, filter: &Filter, patch: &Patch)
    -> Result<u64>;

    async fn delete_many(&mut self, entity: EntityType, filter: &Filter) -> Result<u64>;

    /// Deletes exactly one record; a missing record is `NotFound`.
    async fn delete_one(&mut self, entity: EntityType, id: &RecordId) -> Result<VersionedRecord>;
}
