use super::ConflictResolutionStrategy;
use crate::core::{EntityType, Patch, RecordId, StoreError, VersionedRecord};
use crate::error::{AppError, AppResult};
use crate::facade::RecordStore;
use crate::storage::StorageAdapter;
use log::{debug, warn};

impl<S: StorageAdapter> RecordStore<S> {
    /// Applies `patch` to one record if its stored version is still
    /// `expected_version`.
    ///
    /// The check and the write are a single compare-and-swap in storage, so
    /// among concurrent `Fail` callers sharing an expected version exactly
    /// one wins and the version advances by one. On a miss:
    /// - `Fail` reports `CONFLICT` (or `NOT_FOUND` if the record is gone);
    /// - `Retry` re-reads the version and reapplies the patch, up to
    ///   `RetryPolicy::max_attempts`, then reports `CONFLICT`;
    /// - `Overwrite` never misses on version.
    pub async fn safe_update(
        &self,
        entity: EntityType,
        id: RecordId,
        expected_version: u64,
        patch: Patch,
        strategy: ConflictResolutionStrategy,
    ) -> AppResult<VersionedRecord> {
        patch.validate()?;

        match strategy {
            ConflictResolutionStrategy::Fail => {
                self.update_or_conflict(entity, id, expected_version, &patch)
                    .await
            }
            ConflictResolutionStrategy::Retry => {
                self.update_with_retry(entity, id, expected_version, &patch)
                    .await
            }
            ConflictResolutionStrategy::Overwrite => self.overwrite(entity, id, &patch).await,
        }
    }

    async fn update_or_conflict(
        &self,
        entity: EntityType,
        id: RecordId,
        expected_version: u64,
        patch: &Patch,
    ) -> AppResult<VersionedRecord> {
        let outcome = self
            .bounded(self.storage().conditional_write(entity, &id, expected_version, patch))
            .await?;
        if let Some(record) = outcome.record {
            return Ok(record);
        }

        let current = self.get_with_version(entity, id).await?;
        debug!(
            "rejected stale write to {}:{} (expected v{}, stored v{})",
            entity, id, expected_version, current.version
        );
        Err(AppError::parse(StoreError::VersionMismatch {
            entity,
            id,
            expected: expected_version,
            actual: current.version,
        }))
    }

    async fn update_with_retry(
        &self,
        entity: EntityType,
        id: RecordId,
        expected_version: u64,
        patch: &Patch,
    ) -> AppResult<VersionedRecord> {
        let policy = &self.config().retry;
        let attempts = policy.attempts();
        let mut expected = expected_version;

        for attempt in 1..=attempts {
            let outcome = self
                .bounded(self.storage().conditional_write(entity, &id, expected, patch))
                .await?;
            if let Some(record) = outcome.record {
                if attempt > 1 {
                    debug!("{}:{} updated on attempt {}", entity, id, attempt);
                }
                return Ok(record);
            }

            let current = self.get_with_version(entity, id).await?;
            if attempt == attempts {
                break;
            }

            let backoff = policy.backoff(attempt);
            warn!(
                "optimistic lock conflict on {}:{} (attempt {} of {}): expected v{}, stored v{}, retrying in {:?}",
                entity, id, attempt, attempts, expected, current.version, backoff
            );
            expected = current.version;
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
        }

        Err(AppError::parse(StoreError::RetriesExhausted {
            entity,
            id,
            attempts,
        }))
    }

    async fn overwrite(
        &self,
        entity: EntityType,
        id: RecordId,
        patch: &Patch,
    ) -> AppResult<VersionedRecord> {
        let outcome = self
            .bounded(self.storage().write(entity, &id, patch))
            .await?;
        outcome
            .record
            .ok_or_else(|| AppError::parse(StoreError::NotFound { entity, id }))
    }
}
