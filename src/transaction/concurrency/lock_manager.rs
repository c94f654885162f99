use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState,
};

/// The five hierarchical lock modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    pub fn is_intention(self) -> bool {
        matches!(
            self,
            LockMode::IntentionShared
                | LockMode::IntentionExclusive
                | LockMode::SharedIntentionExclusive
        )
    }

    /// The classical multi-granularity compatibility matrix
    pub fn compatible(held: LockMode, requested: LockMode) -> bool {
        use LockMode::*;
        match held {
            IntentionShared => requested != Exclusive,
            IntentionExclusive => matches!(requested, IntentionShared | IntentionExclusive),
            Shared => matches!(requested, IntentionShared | Shared),
            SharedIntentionExclusive => requested == IntentionShared,
            Exclusive => false,
        }
    }

    /// Legal upgrade transitions
    pub fn can_upgrade(from: LockMode, to: LockMode) -> bool {
        use LockMode::*;
        match from {
            IntentionShared => {
                matches!(to, Shared | Exclusive | IntentionExclusive | SharedIntentionExclusive)
            }
            Shared => matches!(to, Exclusive | SharedIntentionExclusive),
            IntentionExclusive => matches!(to, Exclusive | SharedIntentionExclusive),
            SharedIntentionExclusive => to == Exclusive,
            Exclusive => false,
        }
    }
}

/// Reasons a lock-manager call aborts the requesting transaction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("lock requested on a shrinking transaction")]
    LockOnShrinking,

    #[error("shared lock requested at read-uncommitted")]
    LockSharedOnReadUncommitted,

    #[error("another upgrade is in progress, or the upgrade path is illegal")]
    UpgradeConflict,

    #[error("intention lock requested on a row")]
    AttemptedIntentionLockOnRow,

    #[error("row lock requested without a compatible table lock")]
    TableLockNotPresent,

    #[error("table unlocked while row locks are still held")]
    TableUnlockedBeforeUnlockingRows,

    #[error("unlock requested but no lock is held")]
    AttemptedUnlockButNoLockHeld,
}

/// The transaction was set to ABORTED before this error was raised
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {reason}")]
pub struct TransactionAbort {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockObject {
    Table,
    Row,
}

enum LockTarget {
    Table(TableOid),
    Row(TableOid, Rid),
}

/// One request in a queue. Holds the transaction so the deadlock detector
/// can abort a victim straight from the queue.
struct LockRequest {
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

struct QueueInner {
    /// FIFO by arrival; upgrades re-enter ahead of waiters
    requests: Vec<LockRequest>,
    /// Transaction currently holding the (single) upgrade slot
    upgrading: Option<TxnId>,
}

/// Per-object request queue with its own mutex and condition variable
struct LockRequestQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner { requests: Vec::new(), upgrading: None }),
            cv: Condvar::new(),
        }
    }
}

fn position_of(inner: &QueueInner, txn_id: TxnId) -> Option<usize> {
    inner.requests.iter().position(|r| r.txn.id() == txn_id)
}

/// FIFO grant check: every granted request must be compatible, and no other
/// waiter may be queued ahead of this one.
fn grantable(inner: &QueueInner, txn_id: TxnId) -> bool {
    let Some(pos) = position_of(inner, txn_id) else {
        return false;
    };
    let mode = inner.requests[pos].mode;
    for request in &inner.requests {
        if request.granted {
            if !LockMode::compatible(request.mode, mode) {
                return false;
            }
        } else {
            return request.txn.id() == txn_id;
        }
    }
    false
}

/// Hierarchical two-level lock manager with strict-2PL state tracking and a
/// background wait-for-graph deadlock detector.
///
/// Lock acquisition order is map mutex, then queue mutex; the map mutex is
/// released before any wait on a queue's condition variable.
pub struct LockManager {
    table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_lock_map: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,

    waits_for: Mutex<BTreeMap<TxnId, Vec<TxnId>>>,

    cycle_detection_interval: Duration,
    detector_enabled: AtomicBool,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    pub fn new(cycle_detection_interval: Duration) -> Self {
        Self {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            waits_for: Mutex::new(BTreeMap::new()),
            cycle_detection_interval,
            detector_enabled: AtomicBool::new(false),
            detector: Mutex::new(None),
        }
    }

    /// Acquire a table lock, blocking until granted. Returns false when the
    /// transaction was aborted while waiting (deadlock victim or external
    /// abort).
    pub fn lock_table(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<bool, TransactionAbort> {
        self.check_request(txn, mode, LockObject::Table)?;
        let queue = {
            let mut map = self.table_lock_map.lock();
            Arc::clone(map.entry(oid).or_insert_with(|| Arc::new(LockRequestQueue::new())))
        };
        self.acquire(txn, mode, &queue, &LockTarget::Table(oid))
    }

    /// Acquire a row lock. The transaction must already hold a covering
    /// table lock.
    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
        rid: Rid,
    ) -> Result<bool, TransactionAbort> {
        self.check_request(txn, mode, LockObject::Row)?;
        self.check_table_lock_present(txn, mode, oid)?;
        let queue = {
            let mut map = self.row_lock_map.lock();
            Arc::clone(map.entry(rid).or_insert_with(|| Arc::new(LockRequestQueue::new())))
        };
        self.acquire(txn, mode, &queue, &LockTarget::Row(oid, rid))
    }

    /// Release a table lock, applying the isolation level's 2PL transition.
    /// Every row lock on the table must have been released first.
    pub fn unlock_table(
        &self,
        txn: &Arc<Transaction>,
        oid: TableOid,
    ) -> Result<bool, TransactionAbort> {
        let queue = self.table_lock_map.lock().get(&oid).cloned();
        let Some(queue) = queue else {
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };
        if txn.holds_row_locks_on(oid) {
            return Err(self.abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let mut inner = queue.inner.lock();
        let Some(pos) = inner
            .requests
            .iter()
            .position(|r| r.txn.id() == txn.id() && r.granted)
        else {
            drop(inner);
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };
        let mode = inner.requests[pos].mode;
        self.apply_unlock_transition(txn, mode)?;
        inner.requests.remove(pos);
        txn.remove_table_lock(mode, oid);
        drop(inner);
        queue.cv.notify_all();
        log::trace!("txn {} unlocked table {} ({:?})", txn.id(), oid, mode);
        Ok(true)
    }

    /// Release a row lock, applying the isolation level's 2PL transition
    pub fn unlock_row(
        &self,
        txn: &Arc<Transaction>,
        oid: TableOid,
        rid: Rid,
    ) -> Result<bool, TransactionAbort> {
        let queue = self.row_lock_map.lock().get(&rid).cloned();
        let Some(queue) = queue else {
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let mut inner = queue.inner.lock();
        let Some(pos) = inner
            .requests
            .iter()
            .position(|r| r.txn.id() == txn.id() && r.granted)
        else {
            drop(inner);
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };
        let mode = inner.requests[pos].mode;
        self.apply_unlock_transition(txn, mode)?;
        inner.requests.remove(pos);
        txn.remove_row_lock(mode, oid, rid);
        drop(inner);
        queue.cv.notify_all();
        log::trace!("txn {} unlocked row {} ({:?})", txn.id(), rid, mode);
        Ok(true)
    }

    /// Common queue protocol: idempotent re-request, upgrade handling, then
    /// FIFO wait on the condition variable.
    fn acquire(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        queue: &Arc<LockRequestQueue>,
        target: &LockTarget,
    ) -> Result<bool, TransactionAbort> {
        let mut inner = queue.inner.lock();

        if let Some(pos) = position_of(&inner, txn.id()) {
            let held = inner.requests[pos].mode;
            if held == mode {
                return Ok(true);
            }
            if inner.upgrading.is_some() {
                drop(inner);
                return Err(self.abort(txn, AbortReason::UpgradeConflict));
            }
            if !LockMode::can_upgrade(held, mode) {
                drop(inner);
                return Err(self.abort(txn, AbortReason::UpgradeConflict));
            }

            // Give up the held lock; the upgrade request goes ahead of all
            // waiters but behind every granted request
            inner.requests.remove(pos);
            self.remove_from_lock_set(txn, held, target);
            inner.upgrading = Some(txn.id());
            let insert_at = inner
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(inner.requests.len());
            inner.requests.insert(
                insert_at,
                LockRequest { txn: Arc::clone(txn), mode, granted: false },
            );

            if !self.wait_for_grant(txn, mode, queue, &mut inner, true) {
                return Ok(false);
            }
            inner.upgrading = None;
            self.add_to_lock_set(txn, mode, target);
            drop(inner);
            if mode != LockMode::Exclusive {
                queue.cv.notify_all();
            }
            log::trace!("txn {} upgraded to {:?}", txn.id(), mode);
            return Ok(true);
        }

        inner
            .requests
            .push(LockRequest { txn: Arc::clone(txn), mode, granted: false });

        if !self.wait_for_grant(txn, mode, queue, &mut inner, false) {
            return Ok(false);
        }
        self.add_to_lock_set(txn, mode, target);
        drop(inner);
        if mode != LockMode::Exclusive {
            queue.cv.notify_all();
        }
        Ok(true)
    }

    /// Block on the queue's condition variable until the request is granted
    /// or the transaction is aborted. On abort the request is withdrawn and
    /// the queue re-notified; returns false in that case.
    fn wait_for_grant(
        &self,
        txn: &Arc<Transaction>,
        _mode: LockMode,
        queue: &Arc<LockRequestQueue>,
        inner: &mut MutexGuard<'_, QueueInner>,
        upgrading: bool,
    ) -> bool {
        loop {
            if grantable(inner, txn.id()) {
                if let Some(pos) = position_of(inner, txn.id()) {
                    inner.requests[pos].granted = true;
                }
                return true;
            }
            queue.cv.wait(inner);
            if txn.state() == TransactionState::Aborted {
                if let Some(pos) = position_of(inner, txn.id()) {
                    inner.requests.remove(pos);
                }
                if upgrading {
                    inner.upgrading = None;
                }
                queue.cv.notify_all();
                return false;
            }
        }
    }

    /// Mode/state validation against the isolation level
    fn check_request(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        object: LockObject,
    ) -> Result<(), TransactionAbort> {
        if object == LockObject::Row && mode.is_intention() {
            return Err(self.abort(txn, AbortReason::AttemptedIntentionLockOnRow));
        }

        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if matches!(
                    mode,
                    LockMode::Shared | LockMode::IntentionShared | LockMode::SharedIntentionExclusive
                ) {
                    return Err(self.abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if txn.state() == TransactionState::Shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                // Only IS and S may still be taken while shrinking
                if txn.state() == TransactionState::Shrinking
                    && !matches!(mode, LockMode::IntentionShared | LockMode::Shared)
                {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if txn.state() == TransactionState::Shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    /// A row lock needs a covering table lock: S rows under any table lock
    /// at IS or stronger, X rows under IX, SIX or X
    fn check_table_lock_present(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<(), TransactionAbort> {
        let covered = match mode {
            LockMode::Shared => {
                txn.is_table_intention_shared_locked(oid)
                    || txn.is_table_shared_locked(oid)
                    || txn.is_table_intention_exclusive_locked(oid)
                    || txn.is_table_shared_intention_exclusive_locked(oid)
                    || txn.is_table_exclusive_locked(oid)
            }
            LockMode::Exclusive => {
                txn.is_table_intention_exclusive_locked(oid)
                    || txn.is_table_shared_intention_exclusive_locked(oid)
                    || txn.is_table_exclusive_locked(oid)
            }
            _ => true,
        };
        if !covered {
            return Err(self.abort(txn, AbortReason::TableLockNotPresent));
        }
        Ok(())
    }

    /// 2PL state transitions on unlock, from GROWING only
    fn apply_unlock_transition(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
    ) -> Result<(), TransactionAbort> {
        if txn.state() != TransactionState::Growing {
            return Ok(());
        }
        match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                if matches!(mode, LockMode::Shared | LockMode::Exclusive) {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
            IsolationLevel::ReadCommitted => {
                if mode == LockMode::Exclusive {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
            IsolationLevel::ReadUncommitted => {
                if mode == LockMode::Exclusive {
                    txn.set_state(TransactionState::Shrinking);
                }
                if mode == LockMode::Shared {
                    // S locks cannot legally exist at this level
                    return Err(self.abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
            }
        }
        Ok(())
    }

    fn add_to_lock_set(&self, txn: &Arc<Transaction>, mode: LockMode, target: &LockTarget) {
        match target {
            LockTarget::Table(oid) => txn.add_table_lock(mode, *oid),
            LockTarget::Row(oid, rid) => txn.add_row_lock(mode, *oid, *rid),
        }
    }

    fn remove_from_lock_set(&self, txn: &Arc<Transaction>, mode: LockMode, target: &LockTarget) {
        match target {
            LockTarget::Table(oid) => txn.remove_table_lock(mode, *oid),
            LockTarget::Row(oid, rid) => txn.remove_row_lock(mode, *oid, *rid),
        }
    }

    fn abort(&self, txn: &Arc<Transaction>, reason: AbortReason) -> TransactionAbort {
        txn.set_state(TransactionState::Aborted);
        log::debug!("txn {} aborted: {}", txn.id(), reason);
        TransactionAbort { txn_id: txn.id(), reason }
    }

    // ------------------------------------------------------------------
    // Deadlock detection
    // ------------------------------------------------------------------

    pub fn add_edge(&self, t1: TxnId, t2: TxnId) {
        let mut graph = self.waits_for.lock();
        Self::add_edge_locked(&mut graph, t1, t2);
    }

    fn add_edge_locked(graph: &mut BTreeMap<TxnId, Vec<TxnId>>, t1: TxnId, t2: TxnId) {
        let edges = graph.entry(t1).or_default();
        if !edges.contains(&t2) {
            edges.push(t2);
        }
    }

    pub fn remove_edge(&self, t1: TxnId, t2: TxnId) {
        let mut graph = self.waits_for.lock();
        if let Some(edges) = graph.get_mut(&t1) {
            edges.retain(|&t| t != t2);
            if edges.is_empty() {
                graph.remove(&t1);
            }
        }
    }

    /// DFS over start nodes and neighbors in ascending txn-id order; on a
    /// cycle, reports the largest id among the cycle's members as the victim
    pub fn has_cycle(&self) -> Option<TxnId> {
        let graph = self.waits_for.lock();
        Self::find_cycle(&graph)
    }

    fn find_cycle(graph: &BTreeMap<TxnId, Vec<TxnId>>) -> Option<TxnId> {
        fn dfs(
            graph: &BTreeMap<TxnId, Vec<TxnId>>,
            id: TxnId,
            path: &mut Vec<TxnId>,
        ) -> Option<TxnId> {
            let mut neighbors = graph.get(&id)?.clone();
            neighbors.sort_unstable();
            for next in neighbors {
                if let Some(pos) = path.iter().position(|&n| n == next) {
                    // The back edge closes a cycle of the nodes from `next`
                    // down to the current one; lead-in nodes earlier on the
                    // path are bystanders, not victim candidates
                    return path[pos..].iter().copied().max();
                }
                path.push(next);
                if let Some(victim) = dfs(graph, next, path) {
                    return Some(victim);
                }
                path.pop();
            }
            None
        }

        for &start in graph.keys() {
            let mut path = vec![start];
            if let Some(victim) = dfs(graph, start, &mut path) {
                return Some(victim);
            }
        }
        None
    }

    pub fn get_edge_list(&self) -> Vec<(TxnId, TxnId)> {
        let graph = self.waits_for.lock();
        graph
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect()
    }

    /// One detection pass: rebuild the wait-for graph from both lock maps,
    /// then abort victims (largest id per cycle) until no cycle remains.
    /// Returns the aborted transaction ids.
    pub fn detect_and_break(&self) -> Vec<TxnId> {
        let queues: Vec<Arc<LockRequestQueue>> = {
            let tables = self.table_lock_map.lock();
            tables.values().cloned().collect()
        };
        let row_queues: Vec<Arc<LockRequestQueue>> = {
            let rows = self.row_lock_map.lock();
            rows.values().cloned().collect()
        };

        let mut graph = self.waits_for.lock();
        graph.clear();
        for queue in queues.iter().chain(row_queues.iter()) {
            let inner = queue.inner.lock();
            for waiter in inner.requests.iter().filter(|r| !r.granted) {
                for holder in inner.requests.iter().filter(|r| r.granted) {
                    if waiter.txn.id() != holder.txn.id() {
                        Self::add_edge_locked(&mut graph, waiter.txn.id(), holder.txn.id());
                    }
                }
            }
        }

        let mut victims = Vec::new();
        while let Some(victim) = Self::find_cycle(&graph) {
            log::warn!("deadlock detected, aborting transaction {}", victim);
            victims.push(victim);

            // Abort the victim and wake every queue it is waiting in; the
            // victim's own thread withdraws the request on wakeup
            for queue in queues.iter().chain(row_queues.iter()) {
                let found = {
                    let inner = queue.inner.lock();
                    match inner.requests.iter().find(|r| r.txn.id() == victim) {
                        Some(request) => {
                            request.txn.set_state(TransactionState::Aborted);
                            true
                        }
                        None => false,
                    }
                };
                if found {
                    queue.cv.notify_all();
                }
            }

            graph.remove(&victim);
            for edges in graph.values_mut() {
                edges.retain(|&t| t != victim);
            }
            graph.retain(|_, edges| !edges.is_empty());
        }
        victims
    }

    /// Spawn the background detector thread
    pub fn start_cycle_detection(self: &Arc<Self>) {
        if self.detector_enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        let lm = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            log::debug!("deadlock detector running");
            while lm.detector_enabled.load(Ordering::SeqCst) {
                std::thread::sleep(lm.cycle_detection_interval);
                if !lm.detector_enabled.load(Ordering::SeqCst) {
                    break;
                }
                lm.detect_and_break();
            }
            log::debug!("deadlock detector stopped");
        });
        *self.detector.lock() = Some(handle);
    }

    /// Stop and join the detector thread
    pub fn stop_cycle_detection(&self) {
        self.detector_enabled.store(false, Ordering::SeqCst);
        if let Some(handle) = self.detector.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        let modes = [IntentionShared, IntentionExclusive, Shared, SharedIntentionExclusive, Exclusive];
        // Rows: held; columns: requested (the matrix from the design docs)
        let expected = [
            [true, true, true, true, false],   // IS
            [true, true, false, false, false], // IX
            [true, false, true, false, false], // S
            [true, false, false, false, false],// SIX
            [false, false, false, false, false],// X
        ];
        for (i, &held) in modes.iter().enumerate() {
            for (j, &requested) in modes.iter().enumerate() {
                assert_eq!(
                    LockMode::compatible(held, requested),
                    expected[i][j],
                    "held {:?}, requested {:?}",
                    held,
                    requested
                );
            }
        }
    }

    #[test]
    fn test_upgrade_paths() {
        use LockMode::*;
        assert!(LockMode::can_upgrade(IntentionShared, Shared));
        assert!(LockMode::can_upgrade(IntentionShared, Exclusive));
        assert!(LockMode::can_upgrade(IntentionShared, IntentionExclusive));
        assert!(LockMode::can_upgrade(IntentionShared, SharedIntentionExclusive));
        assert!(LockMode::can_upgrade(Shared, Exclusive));
        assert!(LockMode::can_upgrade(Shared, SharedIntentionExclusive));
        assert!(LockMode::can_upgrade(IntentionExclusive, Exclusive));
        assert!(LockMode::can_upgrade(SharedIntentionExclusive, Exclusive));

        assert!(!LockMode::can_upgrade(Shared, IntentionShared));
        assert!(!LockMode::can_upgrade(Exclusive, Shared));
        assert!(!LockMode::can_upgrade(SharedIntentionExclusive, Shared));
    }

    #[test]
    fn test_wait_for_graph_edges() {
        let lm = LockManager::new(Duration::from_millis(10));
        lm.add_edge(1, 2);
        lm.add_edge(1, 2); // duplicates suppressed
        lm.add_edge(2, 3);
        assert_eq!(lm.get_edge_list(), vec![(1, 2), (2, 3)]);

        lm.remove_edge(1, 2);
        assert_eq!(lm.get_edge_list(), vec![(2, 3)]);
        lm.remove_edge(2, 3);
        assert!(lm.get_edge_list().is_empty());
    }

    #[test]
    fn test_cycle_detection_picks_largest_id() {
        let lm = LockManager::new(Duration::from_millis(10));
        lm.add_edge(0, 1);
        lm.add_edge(1, 0);
        assert_eq!(lm.has_cycle(), Some(1));

        let lm = LockManager::new(Duration::from_millis(10));
        lm.add_edge(2, 5);
        lm.add_edge(5, 9);
        lm.add_edge(9, 2);
        assert_eq!(lm.has_cycle(), Some(9));
    }

    #[test]
    fn test_no_cycle() {
        let lm = LockManager::new(Duration::from_millis(10));
        lm.add_edge(1, 2);
        lm.add_edge(2, 3);
        lm.add_edge(1, 3);
        assert_eq!(lm.has_cycle(), None);
    }

    #[test]
    fn test_victim_is_on_the_cycle_not_the_lead_in() {
        // 1 -> 10 -> 5 <-> 6: only {5, 6} form the cycle, so the victim is
        // 6 even though larger ids sit on the path into it
        let lm = LockManager::new(Duration::from_millis(10));
        lm.add_edge(1, 10);
        lm.add_edge(10, 5);
        lm.add_edge(5, 6);
        lm.add_edge(6, 5);
        assert_eq!(lm.has_cycle(), Some(6));
    }

    #[test]
    fn test_neighbors_searched_in_ascending_order() {
        // Node 1 closes two cycles; the edge to 3 was inserted first, but
        // the ascending traversal must discover the cycle through 2
        let lm = LockManager::new(Duration::from_millis(10));
        lm.add_edge(1, 3);
        lm.add_edge(3, 1);
        lm.add_edge(1, 2);
        lm.add_edge(2, 1);
        assert_eq!(lm.has_cycle(), Some(2));
    }
}
