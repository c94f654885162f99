mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::setup;
use stratadb::common::types::Rid;
use stratadb::transaction::concurrency::{
    AbortReason, IsolationLevel, LockManager, LockMode, Transaction, TransactionState,
};

fn lm() -> Arc<LockManager> {
    Arc::new(LockManager::new(Duration::from_millis(20)))
}

fn txn(id: u32, level: IsolationLevel) -> Arc<Transaction> {
    Arc::new(Transaction::new(id, level))
}

#[test]
fn test_lock_is_idempotent() {
    setup();
    let lm = lm();
    let t = txn(1, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t, LockMode::Shared, 0).unwrap());
    assert!(lm.lock_table(&t, LockMode::Shared, 0).unwrap());
    assert!(t.is_table_shared_locked(0));

    assert!(lm.unlock_table(&t, 0).unwrap());
    assert!(!t.is_table_shared_locked(0));
    // The second request granted nothing extra, so a second unlock fails
    let err = lm.unlock_table(&t, 0).unwrap_err();
    assert_eq!(err.reason, AbortReason::AttemptedUnlockButNoLockHeld);
}

#[test]
fn test_shared_locks_forbidden_at_read_uncommitted() {
    setup();
    let lm = lm();
    for mode in [LockMode::Shared, LockMode::IntentionShared, LockMode::SharedIntentionExclusive] {
        let t = txn(1, IsolationLevel::ReadUncommitted);
        let err = lm.lock_table(&t, mode, 0).unwrap_err();
        assert_eq!(err.reason, AbortReason::LockSharedOnReadUncommitted);
        assert_eq!(t.state(), TransactionState::Aborted);
    }
}

#[test]
fn test_intention_locks_forbidden_on_rows() {
    setup();
    let lm = lm();
    for mode in [
        LockMode::IntentionShared,
        LockMode::IntentionExclusive,
        LockMode::SharedIntentionExclusive,
    ] {
        let t = txn(1, IsolationLevel::RepeatableRead);
        let err = lm.lock_row(&t, mode, 0, Rid::new(2, 0)).unwrap_err();
        assert_eq!(err.reason, AbortReason::AttemptedIntentionLockOnRow);
        assert_eq!(t.state(), TransactionState::Aborted);
    }
}

#[test]
fn test_row_lock_requires_table_lock() {
    setup();
    let lm = lm();

    let t = txn(1, IsolationLevel::RepeatableRead);
    let err = lm.lock_row(&t, LockMode::Shared, 0, Rid::new(2, 0)).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableLockNotPresent);

    // IS covers S rows but not X rows
    let t = txn(2, IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t, LockMode::IntentionShared, 0).unwrap());
    assert!(lm.lock_row(&t, LockMode::Shared, 0, Rid::new(2, 0)).unwrap());
    let err = lm.lock_row(&t, LockMode::Exclusive, 0, Rid::new(2, 1)).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableLockNotPresent);

    // IX covers both
    let t = txn(3, IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t, LockMode::IntentionExclusive, 0).unwrap());
    assert!(lm.lock_row(&t, LockMode::Exclusive, 0, Rid::new(2, 2)).unwrap());
}

#[test]
fn test_table_unlock_blocked_by_row_locks() {
    setup();
    let lm = lm();
    let t = txn(1, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t, LockMode::IntentionShared, 0).unwrap());
    assert!(lm.lock_row(&t, LockMode::Shared, 0, Rid::new(2, 0)).unwrap());

    let err = lm.unlock_table(&t, 0).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableUnlockedBeforeUnlockingRows);
}

#[test]
fn test_repeatable_read_shrinks_on_s_release() {
    setup();
    let lm = lm();
    let t = txn(1, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t, LockMode::Shared, 0).unwrap());
    assert!(lm.unlock_table(&t, 0).unwrap());
    assert_eq!(t.state(), TransactionState::Shrinking);

    // Strict 2PL: no lock may follow
    let err = lm.lock_table(&t, LockMode::Shared, 1).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockOnShrinking);
    assert_eq!(t.state(), TransactionState::Aborted);
}

#[test]
fn test_read_committed_keeps_growing_on_s_release() {
    setup();
    let lm = lm();
    let t = txn(1, IsolationLevel::ReadCommitted);

    assert!(lm.lock_table(&t, LockMode::Shared, 0).unwrap());
    assert!(lm.unlock_table(&t, 0).unwrap());
    assert_eq!(t.state(), TransactionState::Growing);

    // X release is what starts shrinking at this level
    assert!(lm.lock_table(&t, LockMode::Exclusive, 1).unwrap());
    assert!(lm.unlock_table(&t, 1).unwrap());
    assert_eq!(t.state(), TransactionState::Shrinking);

    // IS and S are still allowed while shrinking, X is not
    assert!(lm.lock_table(&t, LockMode::IntentionShared, 2).unwrap());
    assert!(lm.lock_table(&t, LockMode::Shared, 3).unwrap());
    let err = lm.lock_table(&t, LockMode::Exclusive, 4).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockOnShrinking);
}

#[test]
fn test_exclusive_blocks_until_released() {
    setup();
    let lm = lm();
    let t1 = txn(1, IsolationLevel::RepeatableRead);
    let t2 = txn(2, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t1, LockMode::Exclusive, 0).unwrap());

    let lm2 = Arc::clone(&lm);
    let t2c = Arc::clone(&t2);
    let waiter = thread::spawn(move || lm2.lock_table(&t2c, LockMode::Shared, 0).unwrap());

    // Give the waiter time to queue up, then release
    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished(), "S must wait behind a granted X");
    assert!(lm.unlock_table(&t1, 0).unwrap());

    assert!(waiter.join().unwrap());
    assert!(t2.is_table_shared_locked(0));
}

#[test]
fn test_shared_locks_coexist() {
    setup();
    let lm = lm();
    let t1 = txn(1, IsolationLevel::RepeatableRead);
    let t2 = txn(2, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t1, LockMode::Shared, 0).unwrap());
    assert!(lm.lock_table(&t2, LockMode::Shared, 0).unwrap());
    assert!(t1.is_table_shared_locked(0));
    assert!(t2.is_table_shared_locked(0));
}

#[test]
fn test_upgrade_conflict_aborts_second_upgrader() {
    setup();
    let lm = lm();
    let t0 = txn(1, IsolationLevel::RepeatableRead);
    let t1 = txn(2, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t0, LockMode::Shared, 0).unwrap());
    assert!(lm.lock_table(&t1, LockMode::Shared, 0).unwrap());

    // T0 starts upgrading S -> X; it must wait for T1's S
    let lm0 = Arc::clone(&lm);
    let t0c = Arc::clone(&t0);
    let upgrader = thread::spawn(move || lm0.lock_table(&t0c, LockMode::Exclusive, 0).unwrap());
    thread::sleep(Duration::from_millis(50));
    assert!(!upgrader.is_finished());

    // T1's own upgrade attempt hits the occupied upgrade slot
    let err = lm.lock_table(&t1, LockMode::Exclusive, 0).unwrap_err();
    assert_eq!(err.reason, AbortReason::UpgradeConflict);
    assert_eq!(t1.state(), TransactionState::Aborted);

    // Once T1 departs, T0's upgrade completes
    assert!(lm.unlock_table(&t1, 0).unwrap());
    assert!(upgrader.join().unwrap());
    assert!(t0.is_table_exclusive_locked(0));
    assert!(!t0.is_table_shared_locked(0));
}

#[test]
fn test_illegal_upgrade_path_rejected() {
    setup();
    let lm = lm();
    let t = txn(1, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t, LockMode::Exclusive, 0).unwrap());
    let err = lm.lock_table(&t, LockMode::Shared, 0).unwrap_err();
    assert_eq!(err.reason, AbortReason::UpgradeConflict);
    assert_eq!(t.state(), TransactionState::Aborted);
}

#[test]
fn test_deadlock_detector_aborts_largest_id() {
    setup();
    let lm = lm();
    let row_a = Rid::new(5, 0);
    let row_b = Rid::new(5, 1);

    let t0 = txn(1, IsolationLevel::RepeatableRead);
    let t1 = txn(2, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t0, LockMode::IntentionExclusive, 0).unwrap());
    assert!(lm.lock_table(&t1, LockMode::IntentionExclusive, 0).unwrap());
    assert!(lm.lock_row(&t0, LockMode::Exclusive, 0, row_a).unwrap());
    assert!(lm.lock_row(&t1, LockMode::Exclusive, 0, row_b).unwrap());

    // Cross requests: t0 wants t1's row and vice versa
    let lm0 = Arc::clone(&lm);
    let t0c = Arc::clone(&t0);
    let h0 = thread::spawn(move || lm0.lock_row(&t0c, LockMode::Exclusive, 0, row_b).unwrap());
    let lm1 = Arc::clone(&lm);
    let t1c = Arc::clone(&t1);
    let h1 = thread::spawn(move || lm1.lock_row(&t1c, LockMode::Exclusive, 0, row_a).unwrap());

    thread::sleep(Duration::from_millis(100));
    let victims = lm.detect_and_break();
    assert_eq!(victims, vec![2], "the larger txn id is the victim");

    // The victim's blocked call observes the abort and gives up
    assert!(!h1.join().unwrap());
    assert_eq!(t1.state(), TransactionState::Aborted);

    // Once the victim's locks are gone, the survivor is granted
    assert!(lm.unlock_row(&t1, 0, row_b).unwrap());
    assert!(lm.unlock_table(&t1, 0).unwrap());
    assert!(h0.join().unwrap());
    assert!(t0.is_row_exclusive_locked(0, row_b));
}

#[test]
fn test_background_detector_breaks_cycle() {
    setup();
    let lm = Arc::new(LockManager::new(Duration::from_millis(20)));
    lm.start_cycle_detection();

    let row_a = Rid::new(6, 0);
    let row_b = Rid::new(6, 1);
    let t0 = txn(1, IsolationLevel::RepeatableRead);
    let t1 = txn(2, IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t0, LockMode::IntentionExclusive, 3).unwrap());
    assert!(lm.lock_table(&t1, LockMode::IntentionExclusive, 3).unwrap());
    assert!(lm.lock_row(&t0, LockMode::Exclusive, 3, row_a).unwrap());
    assert!(lm.lock_row(&t1, LockMode::Exclusive, 3, row_b).unwrap());

    let lm0 = Arc::clone(&lm);
    let t0c = Arc::clone(&t0);
    let h0 = thread::spawn(move || lm0.lock_row(&t0c, LockMode::Exclusive, 3, row_b).unwrap());
    let lm1 = Arc::clone(&lm);
    let t1c = Arc::clone(&t1);
    let h1 = thread::spawn(move || lm1.lock_row(&t1c, LockMode::Exclusive, 3, row_a).unwrap());

    // Within a tick or two the detector must have picked the victim
    assert!(!h1.join().unwrap());
    assert_eq!(t1.state(), TransactionState::Aborted);

    assert!(lm.unlock_row(&t1, 3, row_b).unwrap());
    assert!(lm.unlock_table(&t1, 3).unwrap());
    assert!(h0.join().unwrap());

    lm.stop_cycle_detection();
}

#[test]
fn test_granted_set_stays_compatible() {
    setup();
    let lm = lm();

    // Four readers and an intention-shared txn share one table
    let readers: Vec<_> = (1..=4)
        .map(|id| txn(id, IsolationLevel::RepeatableRead))
        .collect();
    for t in &readers {
        assert!(lm.lock_table(t, LockMode::Shared, 0).unwrap());
    }
    let t5 = txn(5, IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t5, LockMode::IntentionShared, 0).unwrap());

    // A writer queues behind them all
    let lm_w = Arc::clone(&lm);
    let tw = txn(6, IsolationLevel::RepeatableRead);
    let twc = Arc::clone(&tw);
    let writer = thread::spawn(move || lm_w.lock_table(&twc, LockMode::Exclusive, 0).unwrap());

    thread::sleep(Duration::from_millis(50));
    assert!(!writer.is_finished(), "X must wait for all readers");

    for t in &readers {
        assert!(lm.unlock_table(t, 0).unwrap());
    }
    assert!(lm.unlock_table(&t5, 0).unwrap());
    assert!(writer.join().unwrap());
    assert!(tw.is_table_exclusive_locked(0));
}
