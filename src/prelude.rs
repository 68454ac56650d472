//! Everything an application handler needs, in one import.
//!
//! Storage internals (`Catalog`, `FaultInjector`, `RecordSet`) stay under
//! [`crate::storage`].

pub use crate::compound::{CompoundFailure, CompoundOperation, CompoundOutcome, StepResult};
pub use crate::concurrency::{
    BatchItemResult, BatchOutcome, ConflictResolutionStrategy, UpdatePlan,
};
pub use crate::config::{RetryPolicy, StoreConfig};
pub use crate::core::{EntityType, Filter, Patch, RecordId, VersionedRecord};
pub use crate::error::{
    ApiErrorOutcome, AppError, AppResult, ErrorKind, ErrorResponse, RequestContext,
    handle_api_error, parse_error,
};
pub use crate::facade::RecordStore;
pub use crate::storage::{InMemoryStorage, StorageAdapter};
pub use crate::transaction::TransactionState;
