use crate::config::StoreConfig;
use crate::core::{EntityType, Filter, Patch, RecordId, Result, StoreError, VersionedRecord};
use crate::error::{AppError, AppResult};
use crate::storage::{InMemoryStorage, StorageAdapter};
use std::future::Future;
use std::sync::Arc;

/// Entry point for every mutation of shared business records.
///
/// Stateless between calls: all coordination happens in the storage engine's
/// compare-and-swap and transaction primitives, so any number of
/// `RecordStore`s (or clones of one) can front the same storage.
///
/// The mutation surface is spread over several modules:
/// - single-record updates: [`RecordStore::safe_update`]
/// - batches: [`RecordStore::safe_batch_update`]
/// - compound operations: [`RecordStore::execute_compound`] and the cascades
pub struct RecordStore<S: StorageAdapter> {
    storage: Arc<S>,
    config: StoreConfig,
}

impl<S: StorageAdapter> Clone for RecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
        }
    }
}

impl RecordStore<InMemoryStorage> {
    /// Store backed by a fresh [`InMemoryStorage`] with the CRM catalog.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::new(InMemoryStorage::new(), config)
    }
}

impl<S: StorageAdapter> RecordStore<S> {
    pub fn new(storage: S, config: StoreConfig) -> Self {
        Self::from_shared(Arc::new(storage), config)
    }

    pub fn from_shared(storage: Arc<S>, config: StoreConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Reads the current stored state of a record, version included.
    pub async fn get_with_version(&self, entity: EntityType, id: RecordId) -> AppResult<VersionedRecord> {
        self.bounded(self.storage.read(entity, &id))
            .await?
            .ok_or_else(|| AppError::parse(StoreError::NotFound { entity, id }))
    }

    /// Creates a record at the configured initial version.
    pub async fn create(&self, entity: EntityType, fields: Patch) -> AppResult<VersionedRecord> {
        let initial_version = self.config.initial_version;
        Ok(self
            .bounded(self.storage.create(entity, fields, initial_version))
            .await?)
    }

    pub async fn find(&self, entity: EntityType, filter: &Filter) -> AppResult<Vec<VersionedRecord>> {
        Ok(self.bounded(self.storage.find(entity, filter)).await?)
    }

    /// Awaits a storage round trip under the configured operation timeout.
    pub(crate) async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => operation.await,
        }
    }
}
