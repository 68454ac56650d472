use super::{ConflictResolutionStrategy, UpdatePlan};
use crate::core::{StoreError, VersionedRecord};
use crate::error::{AppError, AppResult};
use crate::facade::RecordStore;
use crate::storage::{StorageAdapter, StorageTransaction};
use log::{debug, warn};
use serde::Serialize;

/// Per-plan result of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<VersionedRecord>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_app_error")]
    pub error: Option<AppError>,
}

impl BatchItemResult {
    fn ok(record: VersionedRecord) -> Self {
        Self {
            success: true,
            data: Some(record),
            error: None,
        }
    }

    fn failed(error: AppError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

fn serialize_app_error<Ser>(error: &Option<AppError>, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
where
    Ser: serde::Serializer,
{
    error
        .as_ref()
        .map(crate::error::ErrorResponse::from)
        .serialize(serializer)
}

/// Outcome of [`RecordStore::safe_batch_update`].
///
/// Batches are all-or-nothing: either `committed` and every result is a
/// success, or nothing was applied and every result carries an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub committed: bool,
    pub results: Vec<BatchItemResult>,
}

impl BatchOutcome {
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// The error that aborted the batch: the failing plan's own error, or
    /// the transaction-level failure if no single plan was at fault.
    pub fn first_error(&self) -> Option<&AppError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }

    /// Updated records in input order, or the error that aborted the batch.
    pub fn into_result(self) -> AppResult<Vec<VersionedRecord>> {
        if !self.committed {
            let error = self
                .first_error()
                .cloned()
                .unwrap_or_else(|| AppError::database("batch was not committed"));
            return Err(error);
        }
        Ok(self.results.into_iter().filter_map(|r| r.data).collect())
    }

    fn committed(records: Vec<VersionedRecord>) -> Self {
        Self {
            committed: true,
            results: records.into_iter().map(BatchItemResult::ok).collect(),
        }
    }

    /// Every plan reports failure. The culprit keeps its own error; with no
    /// culprit (begin or commit failed) every plan carries that error.
    fn rolled_back(len: usize, failed_index: Option<usize>, cause: AppError) -> Self {
        let results = (0..len)
            .map(|index| match failed_index {
                Some(culprit) if culprit != index => {
                    BatchItemResult::failed(AppError::new(
                        cause.kind,
                        format!(
                            "not applied: batch rolled back because plan {} failed: {}",
                            culprit, cause.message
                        ),
                    ))
                }
                _ => BatchItemResult::failed(cause.clone()),
            })
            .collect();

        Self {
            committed: false,
            results,
        }
    }
}

impl<S: StorageAdapter> RecordStore<S> {
    /// Applies every plan inside one storage transaction.
    ///
    /// The strategy applies per plan as in [`RecordStore::safe_update`]; the
    /// transaction is atomic whatever the strategy. The first failing plan
    /// rolls the whole batch back, so no plan's effect is ever visible on
    /// its own.
    pub async fn safe_batch_update(
        &self,
        plans: Vec<UpdatePlan>,
        strategy: ConflictResolutionStrategy,
    ) -> BatchOutcome {
        if plans.is_empty() {
            return BatchOutcome::committed(Vec::new());
        }

        for (index, plan) in plans.iter().enumerate() {
            if let Err(err) = plan.patch.validate() {
                return BatchOutcome::rolled_back(plans.len(), Some(index), err.into());
            }
        }

        let mut tx = match self.bounded(self.storage().begin_transaction()).await {
            Ok(tx) => tx,
            Err(err) => return BatchOutcome::rolled_back(plans.len(), None, err.into()),
        };

        let mut records = Vec::with_capacity(plans.len());
        for (index, plan) in plans.iter().enumerate() {
            match self.apply_plan(&mut tx, plan, strategy).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(
                        "batch of {} rolled back at plan {} ({}:{}): {}",
                        plans.len(),
                        index,
                        plan.entity_type,
                        plan.id,
                        err
                    );
                    if let Err(rollback_err) = self.storage().rollback(tx).await {
                        warn!("rollback after failed batch reported: {}", rollback_err);
                    }
                    return BatchOutcome::rolled_back(plans.len(), Some(index), err);
                }
            }
        }

        match self.bounded(self.storage().commit(tx)).await {
            Ok(()) => {
                debug!("batch of {} committed", records.len());
                BatchOutcome::committed(records)
            }
            Err(err) => BatchOutcome::rolled_back(plans.len(), None, err.into()),
        }
    }

    /// One plan's write inside the batch transaction.
    ///
    /// The transaction holds the storage writer, so a retry only ever has
    /// to catch up with versions as this transaction sees them; no backoff.
    async fn apply_plan(
        &self,
        tx: &mut S::Tx,
        plan: &UpdatePlan,
        strategy: ConflictResolutionStrategy,
    ) -> AppResult<VersionedRecord> {
        let entity = plan.entity_type;
        let id = plan.id;

        if strategy == ConflictResolutionStrategy::Overwrite {
            let outcome = self.bounded(tx.write(entity, &id, &plan.patch)).await?;
            return outcome
                .record
                .ok_or_else(|| AppError::parse(StoreError::NotFound { entity, id }));
        }

        let attempts = match strategy {
            ConflictResolutionStrategy::Retry => self.config().retry.attempts(),
            _ => 1,
        };
        let mut expected = plan.expected_version;

        for _ in 0..attempts {
            let outcome = self
                .bounded(tx.conditional_write(entity, &id, expected, &plan.patch))
                .await?;
            if let Some(record) = outcome.record {
                return Ok(record);
            }

            let current = self
                .bounded(tx.read(entity, &id))
                .await?
                .ok_or_else(|| AppError::parse(StoreError::NotFound { entity, id }))?;

            if strategy == ConflictResolutionStrategy::Fail {
                return Err(AppError::parse(StoreError::VersionMismatch {
                    entity,
                    id,
                    expected: plan.expected_version,
                    actual: current.version,
                }));
            }
            expected = current.version;
        }

        Err(AppError::parse(StoreError::RetriesExhausted {
            entity,
            id,
            attempts,
        }))
    }
}
