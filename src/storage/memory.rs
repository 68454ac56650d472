use super::engine::{StorageAdapter, StorageTransaction, WriteOutcome};
use super::fault::{FaultInjector, StorageOp};
use super::persistence;
use super::{Catalog, RecordSet};
use crate::core::{EntityType, Filter, Patch, RecordId, Result, StoreError, VersionedRecord};
use crate::transaction::{Change, Transaction, TransactionId};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, trace};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// In-process storage engine with linearizable writes.
///
/// - Readers take the state read lock only.
/// - Every writer (single write or transaction) holds the writer lock, so
///   compare-and-swap writes and transactions are serialized.
/// - A transaction mutates a private O(1) clone of the record set; commit
///   swaps it in under the state write lock. Rollback, or dropping the
///   transaction, discards the clone.
#[derive(Clone)]
pub struct InMemoryStorage {
    state: Arc<RwLock<RecordSet>>,
    writer: Arc<Mutex<()>>,
    catalog: Catalog,
    faults: FaultInjector,
}

impl InMemoryStorage {
    /// Empty store using the CRM catalog.
    pub fn new() -> Self {
        Self::with_catalog(Catalog::crm())
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            state: Arc::new(RwLock::new(RecordSet::new())),
            writer: Arc::new(Mutex::new(())),
            catalog,
            faults: FaultInjector::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Point-in-time copy of the committed record set.
    pub async fn snapshot(&self) -> RecordSet {
        self.state.read().await.clone()
    }

    pub async fn row_count(&self, entity: EntityType) -> usize {
        self.state.read().await.row_count(entity)
    }

    /// Writes the committed record set to `path` atomically.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let set = self.snapshot().await;
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || persistence::save_snapshot(&set, &path))
            .await
            .map_err(|e| StoreError::IoError(format!("snapshot task failed: {}", e)))?
    }

    /// Replaces the committed record set with the contents of `path`.
    pub async fn restore_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref().to_path_buf();
        let set = tokio::task::spawn_blocking(move || persistence::load_snapshot(&path))
            .await
            .map_err(|e| StoreError::IoError(format!("snapshot task failed: {}", e)))??;

        let _writer = self.writer.lock().await;
        let rows = set.total_rows();
        *self.state.write().await = set;
        debug!("restored {} records from snapshot", rows);
        Ok(rows)
    }

    /// Runs `op` against a private copy and publishes it only on success.
    async fn write_atomically<T>(
        &self,
        op: StorageOp,
        entity: EntityType,
        f: impl FnOnce(&mut RecordSet, &mut Vec<Change>) -> Result<T>,
    ) -> Result<T> {
        self.faults.check(op, Some(entity))?;

        let _writer = self.writer.lock().await;
        let mut working = self.state.read().await.clone();
        let mut journal = Vec::new();
        let value = f(&mut working, &mut journal)?;
        if !journal.is_empty() {
            *self.state.write().await = working;
        }
        Ok(value)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorage {
    type Tx = MemoryTransaction;

    async fn read(&self, entity: EntityType, id: &RecordId) -> Result<Option<VersionedRecord>> {
        self.faults.check(StorageOp::Read, Some(entity))?;
        Ok(self.state.read().await.get(entity, id).cloned())
    }

    async fn find(&self, entity: EntityType, filter: &Filter) -> Result<Vec<VersionedRecord>> {
        self.faults.check(StorageOp::Find, Some(entity))?;
        Ok(self.state.read().await.scan(entity, filter))
    }

    async fn create(
        &self,
        entity: EntityType,
        fields: Patch,
        initial_version: u64,
    ) -> Result<VersionedRecord> {
        fields.validate_fields()?;
        let record = VersionedRecord::new(entity, fields.into_fields(), initial_version, Utc::now());
        let catalog = self.catalog.clone();
        self.write_atomically(StorageOp::Create, entity, move |set, journal| {
            set.insert(&catalog, record, journal)
        })
        .await
    }

    async fn conditional_write(
        &self,
        entity: EntityType,
        id: &RecordId,
        expected_version: u64,
        patch: &Patch,
    ) -> Result<WriteOutcome> {
        let catalog = self.catalog.clone();
        self.write_atomically(StorageOp::ConditionalWrite, entity, |set, journal| {
            set.update(&catalog, entity, id, Some(expected_version), patch, Utc::now(), journal)
        })
        .await
    }

    async fn write(&self, entity: EntityType, id: &RecordId, patch: &Patch) -> Result<WriteOutcome> {
        let catalog = self.catalog.clone();
        self.write_atomically(StorageOp::Write, entity, |set, journal| {
            set.update(&catalog, entity, id, None, patch, Utc::now(), journal)
        })
        .await
    }

    async fn begin_transaction(&self) -> Result<MemoryTransaction> {
        self.faults.check(StorageOp::Begin, None)?;

        let writer = self.writer.clone().lock_owned().await;
        let working = self.state.read().await.clone();
        let txn = Transaction::new(TransactionId::new());
        debug!("{} begin", txn.id());

        Ok(MemoryTransaction {
            txn,
            working,
            catalog: self.catalog.clone(),
            faults: self.faults.clone(),
            _writer: writer,
        })
    }

    async fn commit(&self, mut tx: MemoryTransaction) -> Result<()> {
        tx.txn.ensure_pending()?;
        if let Err(err) = self.faults.check(StorageOp::Commit, None) {
            tx.txn.rollback()?;
            return Err(err);
        }

        let changes = tx.txn.change_count();
        if changes > 0 {
            let mut state = self.state.write().await;
            *state = std::mem::take(&mut tx.working);
        }
        // Marked committed only once the working set is published.
        tx.txn.commit()?;
        for change in tx.txn.changes() {
            trace!("{} {}", tx.txn.id(), change);
        }
        debug!(
            "{} committed {} changes in {:?}",
            tx.txn.id(),
            changes,
            tx.txn.duration()
        );
        Ok(())
    }

    async fn rollback(&self, mut tx: MemoryTransaction) -> Result<()> {
        let discarded = tx.txn.change_count();
        tx.txn.rollback()?;
        debug!("{} rolled back, {} changes discarded", tx.txn.id(), discarded);
        Ok(())
    }
}

/// An open transaction on [`InMemoryStorage`].
///
/// Holds the engine's writer lock until it is committed, rolled back or
/// dropped.
pub struct MemoryTransaction {
    txn: Transaction,
    working: RecordSet,
    catalog: Catalog,
    faults: FaultInjector,
    _writer: OwnedMutexGuard<()>,
}

impl MemoryTransaction {
    /// Applies `f` to the working set; on error nothing from `f` is kept.
    fn mutate<T>(
        &mut self,
        op: StorageOp,
        entity: EntityType,
        f: impl FnOnce(&mut RecordSet, &Catalog, &mut Vec<Change>) -> Result<T>,
    ) -> Result<T> {
        self.txn.ensure_pending()?;
        self.faults.check(op, Some(entity))?;

        let mut staged = self.working.clone();
        let mut journal = Vec::new();
        let value = f(&mut staged, &self.catalog, &mut journal)?;

        self.working = staged;
        for change in journal {
            self.txn.record_change(change)?;
        }
        Ok(value)
    }
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    fn id(&self) -> TransactionId {
        self.txn.id()
    }

    fn change_count(&self) -> usize {
        self.txn.change_count()
    }

    async fn read(&mut self, entity: EntityType, id: &RecordId) -> Result<Option<VersionedRecord>> {
        self.txn.ensure_pending()?;
        self.faults.check(StorageOp::Read, Some(entity))?;
        Ok(self.working.get(entity, id).cloned())
    }

    async fn find(&mut self, entity: EntityType, filter: &Filter) -> Result<Vec<VersionedRecord>> {
        self.txn.ensure_pending()?;
        self.faults.check(StorageOp::Find, Some(entity))?;
        Ok(self.working.scan(entity, filter))
    }

    async fn create(
        &mut self,
        entity: EntityType,
        fields: Patch,
        initial_version: u64,
    ) -> Result<VersionedRecord> {
        fields.validate_fields()?;
        let record = VersionedRecord::new(entity, fields.into_fields(), initial_version, Utc::now());
        self.mutate(StorageOp::Create, entity, move |set, catalog, journal| {
            set.insert(catalog, record, journal)
        })
    }

    async fn conditional_write(
        &mut self,
        entity: EntityType,
        id: &RecordId,
        expected_version: u64,
        patch: &Patch,
    ) -> Result<WriteOutcome> {
        self.mutate(StorageOp::ConditionalWrite, entity, |set, catalog, journal| {
            set.update(catalog, entity, id, Some(expected_version), patch, Utc::now(), journal)
        })
    }

    async fn write(
        &mut self,
        entity: EntityType,
        id: &RecordId,
        patch: &Patch,
    ) -> Result<WriteOutcome> {
        self.mutate(StorageOp::Write, entity, |set, catalog, journal| {
            set.update(catalog, entity, id, None, patch, Utc::now(), journal)
        })
    }

    async fn update_many(
        &mut self,
        entity: EntityType,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64> {
        self.mutate(StorageOp::UpdateMany, entity, |set, catalog, journal| {
            set.update_many(catalog, entity, filter, patch, Utc::now(), journal)
        })
    }

    async fn delete_many(&mut self, entity: EntityType, filter: &Filter) -> Result<u64> {
        self.mutate(StorageOp::DeleteMany, entity, |set, catalog, journal| {
            set.delete_many(catalog, entity, filter, journal)
        })
    }

    async fn delete_one(&mut self, entity: EntityType, id: &RecordId) -> Result<VersionedRecord> {
        self.mutate(StorageOp::DeleteOne, entity, |set, catalog, journal| {
            set.delete(catalog, entity, id, journal)?
                .ok_or(StoreError::NotFound { entity, id: *id })
        })
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.txn.state().is_pending() {
            debug!(
                "{} dropped while pending, {} changes discarded",
                self.txn.id(),
                self.txn.change_count()
            );
        }
    }
}
