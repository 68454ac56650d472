pub mod catalog;
pub mod engine;
pub mod fault;
pub mod memory;
pub mod persistence;
pub mod table;

pub use catalog::{Catalog, EntitySchema, Reference};
pub use engine::{StorageAdapter, StorageTransaction, WriteOutcome};
pub use fault::{Fault, FaultInjector, StorageOp};
pub use memory::{InMemoryStorage, MemoryTransaction};
pub use table::{RecordSet, Table};
