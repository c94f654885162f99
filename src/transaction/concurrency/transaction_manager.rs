use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::common::types::TxnId;
use crate::index::btree::BTreeError;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState, WriteType,
};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is not active")]
    NotActive(TxnId),

    #[error("Rollback failed: {0}")]
    Rollback(#[from] BTreeError),
}

/// Issues transaction ids, tracks live transactions, and drives the
/// commit/abort protocol: locks are released rows-first at both ends, and an
/// abort first replays the transaction's index writes in reverse.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    catalog: Arc<Catalog>,
    active: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>, catalog: Arc<Catalog>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            lock_manager,
            catalog,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active.lock().insert(txn_id, Arc::clone(&txn));
        log::debug!("txn {} began at {:?}", txn_id, isolation_level);
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active.lock().get(&txn_id).cloned()
    }

    /// Commit: release all locks and retire the transaction
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if matches!(txn.state(), TransactionState::Committed | TransactionState::Aborted) {
            return Err(TransactionError::NotActive(txn.id()));
        }
        self.release_all_locks(txn);
        txn.set_state(TransactionState::Committed);
        self.active.lock().remove(&txn.id());
        log::debug!("txn {} committed", txn.id());
        Ok(())
    }

    /// Abort: undo the transaction's index writes, release all locks, and
    /// retire the transaction. Also used to clean up deadlock victims whose
    /// state is already ABORTED.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::NotActive(txn.id()));
        }
        self.rollback_index_writes(txn)?;
        self.release_all_locks(txn);
        txn.set_state(TransactionState::Aborted);
        self.active.lock().remove(&txn.id());
        log::debug!("txn {} aborted", txn.id());
        Ok(())
    }

    /// Replay the index write log backwards: un-insert, re-insert, un-update
    fn rollback_index_writes(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        let records = txn.take_index_write_set();
        for record in records.into_iter().rev() {
            let Some(table) = self.catalog.table(record.table_oid) else {
                log::warn!("rollback: table oid {} is gone", record.table_oid);
                continue;
            };
            let Some(info) = table.index(&record.index_name) else {
                log::warn!("rollback: index {} is gone", record.index_name);
                continue;
            };
            match record.wtype {
                WriteType::Insert => {
                    info.index.remove(&record.key)?;
                }
                WriteType::Delete => {
                    info.index.insert(record.key, record.rid)?;
                }
                WriteType::Update => {
                    info.index.remove(&record.key)?;
                    if let Some(old_key) = record.old_key {
                        info.index.insert(old_key, record.rid)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Release rows before tables, so the hierarchy check never trips.
    /// Unlock failures during teardown are logged and skipped; the
    /// transaction is ending either way.
    fn release_all_locks(&self, txn: &Arc<Transaction>) {
        for (oid, rid) in txn.held_row_locks() {
            if let Err(e) = self.lock_manager.unlock_row(txn, oid, rid) {
                log::warn!("txn {}: releasing row {} failed: {}", txn.id(), rid, e);
            }
        }
        for oid in txn.held_table_locks() {
            if let Err(e) = self.lock_manager.unlock_table(txn, oid) {
                log::warn!("txn {}: releasing table {} failed: {}", txn.id(), oid, e);
            }
        }
    }
}
