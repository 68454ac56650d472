use crate::core::{EntityType, Result, StoreError};
use std::sync::{Arc, Mutex};

/// Storage operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Read,
    Find,
    Create,
    ConditionalWrite,
    Write,
    UpdateMany,
    DeleteMany,
    DeleteOne,
    Begin,
    Commit,
}

/// A failure waiting for the next matching storage operation.
#[derive(Debug, Clone)]
pub struct Fault {
    op: StorageOp,
    entity: Option<EntityType>,
    skip: usize,
    error: StoreError,
}

impl Fault {
    pub fn new(op: StorageOp, error: StoreError) -> Self {
        Self {
            op,
            entity: None,
            skip: 0,
            error,
        }
    }

    /// Only fire for operations on `entity`.
    pub fn on(mut self, entity: EntityType) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Let `n` matching operations through before firing.
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    fn matches(&self, op: StorageOp, entity: Option<EntityType>) -> bool {
        self.op == op && (self.entity.is_none() || self.entity == entity)
    }
}

/// One-shot failure injection for exercising error and rollback paths.
///
/// Clones share the same armed set. Each fault fires once and is then
/// removed.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    armed: Arc<Mutex<Vec<Fault>>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, fault: Fault) -> Result<()> {
        self.armed.lock()?.push(fault);
        Ok(())
    }

    pub fn disarm_all(&self) -> Result<()> {
        self.armed.lock()?.clear();
        Ok(())
    }

    pub fn armed_count(&self) -> usize {
        self.armed.lock().map(|armed| armed.len()).unwrap_or(0)
    }

    /// Fails with the first armed fault matching this operation, if any.
    pub fn check(&self, op: StorageOp, entity: Option<EntityType>) -> Result<()> {
        let mut armed = self.armed.lock()?;
        let Some(position) = armed.iter().position(|fault| fault.matches(op, entity)) else {
            return Ok(());
        };

        if armed[position].skip > 0 {
            armed[position].skip -= 1;
            return Ok(());
        }

        let fault = armed.remove(position);
        Err(fault.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_fires_once_after_skips() {
        let faults = FaultInjector::new();
        faults
            .arm(
                Fault::new(StorageOp::DeleteOne, StoreError::Connection("reset".into()))
                    .on(EntityType::Contact)
                    .after(1),
            )
            .unwrap();

        assert!(faults.check(StorageOp::DeleteOne, Some(EntityType::Deal)).is_ok());
        assert!(faults.check(StorageOp::DeleteOne, Some(EntityType::Contact)).is_ok());
        assert!(matches!(
            faults.check(StorageOp::DeleteOne, Some(EntityType::Contact)),
            Err(StoreError::Connection(_))
        ));
        assert!(faults.check(StorageOp::DeleteOne, Some(EntityType::Contact)).is_ok());
        assert_eq!(faults.armed_count(), 0);
    }

    #[test]
    fn test_clones_share_armed_faults() {
        let faults = FaultInjector::new();
        let shared = faults.clone();
        shared
            .arm(Fault::new(StorageOp::Commit, StoreError::Connection("lost".into())))
            .unwrap();

        assert_eq!(faults.armed_count(), 1);
        faults.disarm_all().unwrap();
        assert_eq!(shared.armed_count(), 0);
    }
}
