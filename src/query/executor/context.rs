use std::sync::Arc;

use crate::catalog::Catalog;
use crate::common::types::{Rid, TableOid};
use crate::query::executor::error::ExecutionError;
use crate::transaction::concurrency::{LockManager, LockMode, Transaction};

/// Everything an executor needs: the transaction it runs on behalf of, the
/// lock manager it must consult before touching a table or row, and the
/// catalog.
#[derive(Clone)]
pub struct ExecutorContext {
    txn: Arc<Transaction>,
    lock_manager: Arc<LockManager>,
    catalog: Arc<Catalog>,
}

impl ExecutorContext {
    pub fn new(
        txn: Arc<Transaction>,
        lock_manager: Arc<LockManager>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self { txn, lock_manager, catalog }
    }

    pub fn txn(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Lock a table, mapping a deadlock-victim wakeup to an execution error
    pub fn lock_table(&self, mode: LockMode, oid: TableOid) -> Result<(), ExecutionError> {
        if !self.lock_manager.lock_table(&self.txn, mode, oid)? {
            return Err(ExecutionError::AbortedWhileWaiting(self.txn.id()));
        }
        Ok(())
    }

    /// Lock a row, mapping a deadlock-victim wakeup to an execution error
    pub fn lock_row(&self, mode: LockMode, oid: TableOid, rid: Rid) -> Result<(), ExecutionError> {
        if !self.lock_manager.lock_row(&self.txn, mode, oid, rid)? {
            return Err(ExecutionError::AbortedWhileWaiting(self.txn.id()));
        }
        Ok(())
    }

    pub fn unlock_table(&self, oid: TableOid) -> Result<(), ExecutionError> {
        self.lock_manager.unlock_table(&self.txn, oid)?;
        Ok(())
    }

    pub fn unlock_row(&self, oid: TableOid, rid: Rid) -> Result<(), ExecutionError> {
        self.lock_manager.unlock_row(&self.txn, oid, rid)?;
        Ok(())
    }
}
