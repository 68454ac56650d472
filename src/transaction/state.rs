// ============================================================================
// Transaction State Management
// ============================================================================
//
// Every transaction moves through: Pending -> Committed | RolledBack.
// A rolled-back transaction leaves no trace in persisted state.
//
// ============================================================================

use super::Change;
use crate::core::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// State transitions:
/// ```text
/// Pending ──commit──> Committed
///   │
///   └──rollback──> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Transaction is open and accepts mutations
    Pending,

    /// Every mutation became durable together
    Committed,

    /// Every mutation was discarded
    RolledBack,
}

impl TransactionState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Pending => write!(f, "PENDING"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Lifecycle and journal of a single storage transaction.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    changes: Vec<Change>,
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Pending,
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Fails unless the transaction still accepts work.
    pub fn ensure_pending(&self) -> Result<()> {
        if !self.state.is_pending() {
            return Err(StoreError::TransactionClosed(format!(
                "{} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Record a change in this transaction
    ///
    /// # Errors
    /// Returns error if transaction is not pending
    pub fn record_change(&mut self, change: Change) -> Result<()> {
        self.ensure_pending()?;
        self.changes.push(change);
        Ok(())
    }

    /// Mark transaction as committed
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as rolled back and discard changes
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.changes.clear();
        self.state = TransactionState::RolledBack;
        Ok(())
    }
}
