// ============================================================================
// crmstore: optimistic concurrency for shared CRM records
// ============================================================================
//
// Layers, leaf first:
// - core:        records, patches, filters, raw storage errors
// - error:       the closed error taxonomy callers branch on
// - storage:     storage adapter traits and the in-memory engine
// - transaction: transaction lifecycle and change journal
// - concurrency: version-checked single and batch updates
// - compound:    multi-step operations committed as one unit
// - facade:      RecordStore, the entry point tying them together
//
// ============================================================================

//! Optimistic concurrency and transactional integrity for shared business
//! records (contacts, companies, deals, activities, users).
//!
//! ```
//! use crmstore::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AppError> {
//! let store = RecordStore::in_memory(StoreConfig::default());
//! let contact = store
//!     .create(EntityType::Contact, Patch::new().set("email", "ada@example.com"))
//!     .await?;
//!
//! let updated = store
//!     .safe_update(
//!         EntityType::Contact,
//!         contact.id,
//!         contact.version,
//!         Patch::new().set("jobTitle", "Engineer"),
//!         ConflictResolutionStrategy::Fail,
//!     )
//!     .await?;
//! assert_eq!(updated.version, contact.version + 1);
//!
//! // The same stale version now conflicts.
//! let err = store
//!     .safe_update(
//!         EntityType::Contact,
//!         contact.id,
//!         contact.version,
//!         Patch::new().set("jobTitle", "Manager"),
//!         ConflictResolutionStrategy::Fail,
//!     )
//!     .await
//!     .unwrap_err();
//! assert_eq!(err.kind, ErrorKind::Conflict);
//! # Ok(())
//! # }
//! ```

pub mod compound;
pub mod concurrency;
pub mod config;
pub mod core;
pub mod error;
pub mod facade;
pub mod prelude;
pub mod storage;
pub mod transaction;

pub use crate::compound::{CompoundFailure, CompoundOperation, CompoundOutcome, StepResult};
pub use crate::concurrency::{BatchItemResult, BatchOutcome, ConflictResolutionStrategy, UpdatePlan};
pub use crate::config::{RetryPolicy, StoreConfig};
pub use crate::core::{EntityType, Filter, Patch, RecordId, StoreError, VersionedRecord};
pub use crate::error::{
    AppError, AppResult, ErrorKind, ErrorResponse, RequestContext, handle_api_error, parse_error,
};
pub use crate::facade::RecordStore;
pub use crate::storage::{InMemoryStorage, StorageAdapter, StorageTransaction};
pub use crate::transaction::TransactionState;
