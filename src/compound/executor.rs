use super::{CompoundOperation, CompoundStep, StepKind};
use crate::core::{Result, VersionedRecord};
use crate::error::AppError;
use crate::facade::RecordStore;
use crate::storage::{StorageAdapter, StorageTransaction};
use crate::transaction::TransactionState;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use tracing::{Instrument, info_span};

/// What one committed step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub label: String,
    pub rows_affected: u64,
    /// The created or deleted record, for single-record steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<VersionedRecord>,
}

/// A committed compound operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundOutcome {
    pub name: String,
    pub state: TransactionState,
    pub operations_completed: usize,
    pub steps: Vec<StepResult>,
}

impl CompoundOutcome {
    pub fn rows_affected(&self) -> u64 {
        self.steps.iter().map(|s| s.rows_affected).sum()
    }

    pub fn step(&self, label: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.label == label)
    }
}

/// A compound operation that was rolled back.
///
/// Nothing it did is visible: `operations_completed` is always zero.
/// `failed_step` is `None` when the transaction itself could not be opened
/// or committed, or when the operation was rejected before it started.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundFailure {
    pub name: String,
    pub failed_step: Option<usize>,
    pub failed_label: Option<String>,
    pub state: TransactionState,
    pub operations_completed: usize,
    pub error: AppError,
}

impl CompoundFailure {
    pub fn rejected(name: impl Into<String>, error: AppError) -> Self {
        Self {
            name: name.into(),
            failed_step: None,
            failed_label: None,
            state: TransactionState::RolledBack,
            operations_completed: 0,
            error,
        }
    }

    fn at_step(name: &str, index: usize, step: &CompoundStep, error: AppError) -> Self {
        Self {
            failed_step: Some(index),
            failed_label: Some(step.label.clone()),
            ..Self::rejected(name, error)
        }
    }
}

impl fmt::Display for CompoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.failed_step, &self.failed_label) {
            (Some(index), Some(label)) => write!(
                f,
                "compound operation '{}' rolled back at step {} ({}): {}",
                self.name, index, label, self.error
            ),
            _ => write!(
                f,
                "compound operation '{}' rolled back: {}",
                self.name, self.error
            ),
        }
    }
}

impl std::error::Error for CompoundFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<CompoundFailure> for AppError {
    fn from(failure: CompoundFailure) -> Self {
        failure.error
    }
}

impl<S: StorageAdapter> RecordStore<S> {
    /// Runs every step of `operation` inside one storage transaction.
    ///
    /// The first failing step rolls the whole operation back and its error is
    /// returned classified but otherwise untouched. Never retried here: a
    /// caller that wants another attempt submits the operation again.
    ///
    /// Dropping the returned future before it completes drops the open
    /// transaction, which rolls it back.
    pub async fn execute_compound(
        &self,
        operation: CompoundOperation,
    ) -> std::result::Result<CompoundOutcome, CompoundFailure> {
        let span = info_span!(
            "compound.execute",
            operation = %operation.name(),
            steps = operation.len()
        );
        self.run_compound(operation).instrument(span).await
    }

    async fn run_compound(
        &self,
        operation: CompoundOperation,
    ) -> std::result::Result<CompoundOutcome, CompoundFailure> {
        let name = operation.name();
        let mut tx = self
            .bounded(self.storage().begin_transaction())
            .await
            .map_err(|err| CompoundFailure::rejected(name, err.into()))?;

        let mut results = Vec::with_capacity(operation.len());
        for (index, step) in operation.steps().iter().enumerate() {
            match self
                .bounded(apply_step(&mut tx, step, self.config().initial_version))
                .await
            {
                Ok(result) => {
                    debug!("{} step {} ({}): {} rows", name, index, step.label, result.rows_affected);
                    results.push(result);
                }
                Err(err) => {
                    let error = AppError::parse(err);
                    warn!(
                        "compound operation '{}' failed at step {} ({}), rolling back: {}",
                        name, index, step, error
                    );
                    if let Err(rollback_err) = self.storage().rollback(tx).await {
                        warn!("rollback of '{}' reported: {}", name, rollback_err);
                    }
                    return Err(CompoundFailure::at_step(name, index, step, error));
                }
            }
        }

        self.bounded(self.storage().commit(tx))
            .await
            .map_err(|err| {
                warn!("compound operation '{}' failed to commit: {}", name, err);
                CompoundFailure::rejected(name, err.into())
            })?;

        debug!("compound operation '{}' committed {} steps", name, results.len());
        Ok(CompoundOutcome {
            name: name.to_string(),
            state: TransactionState::Committed,
            operations_completed: results.len(),
            steps: results,
        })
    }
}

async fn apply_step<T: StorageTransaction>(
    tx: &mut T,
    step: &CompoundStep,
    initial_version: u64,
) -> Result<StepResult> {
    let (rows_affected, record) = match &step.kind {
        StepKind::UpdateMany {
            entity,
            filter,
            patch,
        } => {
            patch.validate()?;
            (tx.update_many(*entity, filter, patch).await?, None)
        }
        StepKind::DeleteMany { entity, filter } => (tx.delete_many(*entity, filter).await?, None),
        StepKind::DeleteOne { entity, id } => (1, Some(tx.delete_one(*entity, id).await?)),
        StepKind::Create { entity, fields } => (
            1,
            Some(tx.create(*entity, fields.clone(), initial_version).await?),
        ),
    };

    Ok(StepResult {
        label: step.label.clone(),
        rows_affected,
        record,
    })
}
