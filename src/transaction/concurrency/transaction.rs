use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, RwLock};

use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::concurrency::lock_manager::LockMode;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase-locking transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Kind of index modification recorded for rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// One index modification made on behalf of a transaction. The transaction
/// manager replays these in reverse to undo an aborted transaction's index
/// writes.
#[derive(Debug, Clone)]
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub table_oid: TableOid,
    pub wtype: WriteType,
    pub index_name: String,
    /// Key written by the operation
    pub key: i64,
    /// Previous key, for updates that moved the row in the index
    pub old_key: Option<i64>,
}

/// An active transaction: its 2PL state plus the held-lock sets the lock
/// manager maintains, one per table mode and one per row mode, and the index
/// write log consumed on abort.
///
/// Shared as `Arc<Transaction>`; all fields use interior mutability because
/// the deadlock detector aborts victims from its own thread.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: RwLock<TransactionState>,

    shared_table_lock_set: Mutex<HashSet<TableOid>>,
    exclusive_table_lock_set: Mutex<HashSet<TableOid>>,
    intention_shared_table_lock_set: Mutex<HashSet<TableOid>>,
    intention_exclusive_table_lock_set: Mutex<HashSet<TableOid>>,
    shared_intention_exclusive_table_lock_set: Mutex<HashSet<TableOid>>,

    shared_row_lock_set: Mutex<HashMap<TableOid, HashSet<Rid>>>,
    exclusive_row_lock_set: Mutex<HashMap<TableOid, HashSet<Rid>>>,

    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: RwLock::new(TransactionState::Growing),
            shared_table_lock_set: Mutex::new(HashSet::new()),
            exclusive_table_lock_set: Mutex::new(HashSet::new()),
            intention_shared_table_lock_set: Mutex::new(HashSet::new()),
            intention_exclusive_table_lock_set: Mutex::new(HashSet::new()),
            shared_intention_exclusive_table_lock_set: Mutex::new(HashSet::new()),
            shared_row_lock_set: Mutex::new(HashMap::new()),
            exclusive_row_lock_set: Mutex::new(HashMap::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    fn table_set(&self, mode: LockMode) -> &Mutex<HashSet<TableOid>> {
        match mode {
            LockMode::Shared => &self.shared_table_lock_set,
            LockMode::Exclusive => &self.exclusive_table_lock_set,
            LockMode::IntentionShared => &self.intention_shared_table_lock_set,
            LockMode::IntentionExclusive => &self.intention_exclusive_table_lock_set,
            LockMode::SharedIntentionExclusive => &self.shared_intention_exclusive_table_lock_set,
        }
    }

    pub(crate) fn add_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.table_set(mode).lock().insert(oid);
    }

    pub(crate) fn remove_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.table_set(mode).lock().remove(&oid);
    }

    pub(crate) fn add_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid) {
        let set = match mode {
            LockMode::Shared => &self.shared_row_lock_set,
            LockMode::Exclusive => &self.exclusive_row_lock_set,
            _ => return,
        };
        set.lock().entry(oid).or_default().insert(rid);
    }

    pub(crate) fn remove_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid) {
        let set = match mode {
            LockMode::Shared => &self.shared_row_lock_set,
            LockMode::Exclusive => &self.exclusive_row_lock_set,
            _ => return,
        };
        let mut map = set.lock();
        if let Some(rids) = map.get_mut(&oid) {
            rids.remove(&rid);
            if rids.is_empty() {
                map.remove(&oid);
            }
        }
    }

    pub fn is_table_shared_locked(&self, oid: TableOid) -> bool {
        self.shared_table_lock_set.lock().contains(&oid)
    }

    pub fn is_table_exclusive_locked(&self, oid: TableOid) -> bool {
        self.exclusive_table_lock_set.lock().contains(&oid)
    }

    pub fn is_table_intention_shared_locked(&self, oid: TableOid) -> bool {
        self.intention_shared_table_lock_set.lock().contains(&oid)
    }

    pub fn is_table_intention_exclusive_locked(&self, oid: TableOid) -> bool {
        self.intention_exclusive_table_lock_set.lock().contains(&oid)
    }

    pub fn is_table_shared_intention_exclusive_locked(&self, oid: TableOid) -> bool {
        self.shared_intention_exclusive_table_lock_set.lock().contains(&oid)
    }

    pub fn is_row_shared_locked(&self, oid: TableOid, rid: Rid) -> bool {
        self.shared_row_lock_set
            .lock()
            .get(&oid)
            .is_some_and(|rids| rids.contains(&rid))
    }

    pub fn is_row_exclusive_locked(&self, oid: TableOid, rid: Rid) -> bool {
        self.exclusive_row_lock_set
            .lock()
            .get(&oid)
            .is_some_and(|rids| rids.contains(&rid))
    }

    /// Any row lock still held under this table?
    pub fn holds_row_locks_on(&self, oid: TableOid) -> bool {
        self.shared_row_lock_set
            .lock()
            .get(&oid)
            .is_some_and(|rids| !rids.is_empty())
            || self
                .exclusive_row_lock_set
                .lock()
                .get(&oid)
                .is_some_and(|rids| !rids.is_empty())
    }

    /// Snapshot of all held table locks, for release at commit/abort
    pub fn held_table_locks(&self) -> Vec<TableOid> {
        let mut oids: Vec<TableOid> = Vec::new();
        for mode in [
            LockMode::IntentionShared,
            LockMode::IntentionExclusive,
            LockMode::Shared,
            LockMode::SharedIntentionExclusive,
            LockMode::Exclusive,
        ] {
            oids.extend(self.table_set(mode).lock().iter().copied());
        }
        oids
    }

    /// Snapshot of all held row locks, for release at commit/abort
    pub fn held_row_locks(&self) -> Vec<(TableOid, Rid)> {
        let mut rows = Vec::new();
        for set in [&self.shared_row_lock_set, &self.exclusive_row_lock_set] {
            for (&oid, rids) in set.lock().iter() {
                rows.extend(rids.iter().map(|&rid| (oid, rid)));
            }
        }
        rows
    }

    pub fn append_index_write_record(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    /// Drain the index write log (used once, on abort)
    pub fn take_index_write_set(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut *self.index_write_set.lock())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation_level", &self.isolation_level)
            .field("state", &self.state())
            .finish()
    }
}
