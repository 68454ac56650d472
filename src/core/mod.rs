pub mod error;
pub mod filter;
pub mod record;
pub mod types;

pub use error::{Result, StoreError};
pub use filter::Filter;
pub use record::{Patch, RESERVED_FIELDS, VersionedRecord};
pub use types::{EntityType, RecordId};
