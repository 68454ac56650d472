// ============================================================================
// Transaction Bookkeeping
// ============================================================================
//
// Lifecycle and change journal shared by every storage transaction:
// - State Pattern: Pending -> Committed | RolledBack
// - Command Pattern: each mutation is journaled as a Change
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::Change;
pub use state::{Transaction, TransactionId, TransactionState};
