mod common;

use common::{key_of, setup, test_engine, tuple_with_key};
use stratadb::query::executor::{build_executor, ExecutorContext};
use stratadb::query::planner::{OrderByExpr, PhysicalOptimizer, PhysicalPlan};
use stratadb::transaction::concurrency::{IsolationLevel, TransactionState};
use stratadb::DbConfig;

fn values_plan(keys: &[i64]) -> PhysicalPlan {
    PhysicalPlan::Values {
        rows: keys.iter().map(|&k| tuple_with_key(k, k as u8)).collect(),
    }
}

fn insert_plan(table: &str, keys: &[i64]) -> PhysicalPlan {
    PhysicalPlan::Insert {
        table: table.to_string(),
        input: Box::new(values_plan(keys)),
    }
}

/// Run a plan to exhaustion, returning the produced tuples
fn run(ctx: &ExecutorContext, plan: &PhysicalPlan) -> Vec<(Vec<u8>, stratadb::common::types::Rid)> {
    let mut executor = build_executor(ctx, plan).unwrap();
    executor.init().unwrap();
    let mut rows = Vec::new();
    while let Some(row) = executor.next().unwrap() {
        rows.push(row);
    }
    rows
}

#[test]
fn test_insert_takes_ix_and_x_locks() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("accounts").unwrap();
    engine.catalog().create_index("accounts", "pk_accounts").unwrap();

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(txn.clone());

    let rows = run(&ctx, &insert_plan("accounts", &[1, 2, 3]));
    assert_eq!(rows.len(), 1);
    assert_eq!(key_of(&rows[0].0), 3, "count tuple reports three inserts");

    // IX on the table, X on each new row, and an index entry per row
    assert!(txn.is_table_intention_exclusive_locked(table.oid));
    let index = table.index("pk_accounts").unwrap();
    for key in [1, 2, 3] {
        let rids = index.index.get_value(&key).unwrap();
        assert_eq!(rids.len(), 1, "key {}", key);
        assert!(txn.is_row_exclusive_locked(table.oid, rids[0]));
    }

    engine.transaction_manager().commit(&txn).unwrap();
    assert_eq!(txn.state(), TransactionState::Committed);
    assert!(!txn.is_table_intention_exclusive_locked(table.oid));
}

#[test]
fn test_read_committed_scan_releases_everything() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("events").unwrap();

    // Seed a row outside any locking executor
    table.heap.insert_tuple(&tuple_with_key(42, 0)).unwrap();

    let txn = engine.begin(IsolationLevel::ReadCommitted);
    let ctx = engine.executor_context(txn.clone());

    let rows = run(&ctx, &PhysicalPlan::SeqScan { table: "events".into() });
    assert_eq!(rows.len(), 1);
    assert_eq!(key_of(&rows[0].0), 42);

    // End-of-scan released the S row lock and the IS table lock
    assert!(!txn.is_table_intention_shared_locked(table.oid));
    assert!(!txn.is_row_shared_locked(table.oid, rows[0].1));
    assert_eq!(txn.state(), TransactionState::Growing);

    engine.transaction_manager().commit(&txn).unwrap();
}

#[test]
fn test_repeatable_read_scan_keeps_locks() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("events").unwrap();
    table.heap.insert_tuple(&tuple_with_key(7, 0)).unwrap();

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(txn.clone());

    let rows = run(&ctx, &PhysicalPlan::SeqScan { table: "events".into() });
    assert_eq!(rows.len(), 1);

    // Strict 2PL: the scan's locks stay until commit
    assert!(txn.is_table_intention_shared_locked(table.oid));
    assert!(txn.is_row_shared_locked(table.oid, rows[0].1));
    assert_eq!(txn.state(), TransactionState::Growing);

    engine.transaction_manager().commit(&txn).unwrap();
    assert!(!txn.is_row_shared_locked(table.oid, rows[0].1));
}

#[test]
fn test_read_uncommitted_scan_takes_no_locks() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("events").unwrap();
    table.heap.insert_tuple(&tuple_with_key(9, 0)).unwrap();

    let txn = engine.begin(IsolationLevel::ReadUncommitted);
    let ctx = engine.executor_context(txn.clone());

    let rows = run(&ctx, &PhysicalPlan::SeqScan { table: "events".into() });
    assert_eq!(rows.len(), 1);
    assert!(!txn.is_table_intention_shared_locked(table.oid));
    assert!(!txn.is_row_shared_locked(table.oid, rows[0].1));
}

#[test]
fn test_index_scan_point_lookup() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("items").unwrap();
    engine.catalog().create_index("items", "pk_items").unwrap();

    let writer = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(writer.clone());
    run(&ctx, &insert_plan("items", &[10, 20, 30]));
    engine.transaction_manager().commit(&writer).unwrap();

    let reader = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(reader.clone());
    let rows = run(
        &ctx,
        &PhysicalPlan::IndexScan { table: "items".into(), index: "pk_items".into(), key: 20 },
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(key_of(&rows[0].0), 20);
    assert!(reader.is_table_intention_shared_locked(table.oid));
    assert!(reader.is_row_shared_locked(table.oid, rows[0].1));

    // Missing key: no rows, no row locks
    let rows = run(
        &ctx,
        &PhysicalPlan::IndexScan { table: "items".into(), index: "pk_items".into(), key: 99 },
    );
    assert!(rows.is_empty());

    engine.transaction_manager().commit(&reader).unwrap();
}

#[test]
fn test_delete_then_abort_restores_index() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("items").unwrap();
    engine.catalog().create_index("items", "pk_items").unwrap();
    let index = table.index("pk_items").unwrap();

    let writer = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(writer.clone());
    run(&ctx, &insert_plan("items", &[1, 2, 3]));
    engine.transaction_manager().commit(&writer).unwrap();

    // Delete everything, then abort
    let deleter = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(deleter.clone());
    let rows = run(
        &ctx,
        &PhysicalPlan::Delete {
            table: "items".into(),
            input: Box::new(PhysicalPlan::SeqScan { table: "items".into() }),
        },
    );
    assert_eq!(key_of(&rows[0].0), 3);
    for key in [1, 2, 3] {
        assert!(index.index.get_value(&key).unwrap().is_empty(), "key {} deleted", key);
    }

    engine.transaction_manager().abort(&deleter).unwrap();
    for key in [1, 2, 3] {
        assert_eq!(index.index.get_value(&key).unwrap().len(), 1, "key {} restored", key);
    }
}

#[test]
fn test_update_moves_index_entry() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("items").unwrap();
    engine.catalog().create_index("items", "pk_items").unwrap();
    let index = table.index("pk_items").unwrap();

    let writer = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(writer.clone());
    run(&ctx, &insert_plan("items", &[5]));
    engine.transaction_manager().commit(&writer).unwrap();

    let updater = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(updater.clone());
    let rows = run(
        &ctx,
        &PhysicalPlan::Update {
            table: "items".into(),
            input: Box::new(PhysicalPlan::SeqScan { table: "items".into() }),
            assignments: vec![(0, 50)],
        },
    );
    assert_eq!(key_of(&rows[0].0), 1);
    assert!(index.index.get_value(&5).unwrap().is_empty());
    assert_eq!(index.index.get_value(&50).unwrap().len(), 1);
    engine.transaction_manager().commit(&updater).unwrap();

    // Heap row reflects the new key as well
    let rid = index.index.get_value(&50).unwrap()[0];
    let tuple = table.heap.get_tuple(rid).unwrap().unwrap();
    assert_eq!(key_of(&tuple), 50);
}

#[test]
fn test_sort_limit_and_top_n_agree() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    engine.catalog().create_table("nums").unwrap();

    let writer = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.executor_context(writer.clone());
    run(&ctx, &insert_plan("nums", &[13, 2, 41, 7, 29, 3, 37, 19]));
    engine.transaction_manager().commit(&writer).unwrap();

    let reader = engine.begin(IsolationLevel::ReadCommitted);
    let ctx = engine.executor_context(reader.clone());

    let sort_limit = PhysicalPlan::Limit {
        input: Box::new(PhysicalPlan::Sort {
            input: Box::new(PhysicalPlan::SeqScan { table: "nums".into() }),
            order_by: vec![OrderByExpr::desc(0)],
        }),
        limit: 3,
    };

    // The optimizer turns the plan into a TopN...
    let optimized = PhysicalOptimizer::new().optimize(sort_limit.clone());
    assert!(matches!(&optimized, PhysicalPlan::TopN { limit: 3, .. }));

    // ...and both shapes produce the same three largest keys
    let keys = |rows: Vec<(Vec<u8>, _)>| rows.iter().map(|(t, _)| key_of(t)).collect::<Vec<_>>();
    let from_sort = keys(run(&ctx, &sort_limit));
    let from_top_n = keys(run(&ctx, &optimized));
    assert_eq!(from_sort, vec![41, 37, 29]);
    assert_eq!(from_top_n, from_sort);

    engine.transaction_manager().commit(&reader).unwrap();
}

#[test]
fn test_write_conflict_blocks_second_writer() {
    setup();
    let (_dir, engine) = test_engine(DbConfig::default());
    let table = engine.catalog().create_table("items").unwrap();
    let rid = table.heap.insert_tuple(&tuple_with_key(1, 0)).unwrap();

    let t1 = engine.begin(IsolationLevel::RepeatableRead);
    let lm = engine.lock_manager();
    assert!(lm.lock_table(&t1, stratadb::LockMode::IntentionExclusive, table.oid).unwrap());
    assert!(lm.lock_row(&t1, stratadb::LockMode::Exclusive, table.oid, rid).unwrap());

    // A second writer's X on the same row waits until t1 commits
    let t2 = engine.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t2, stratadb::LockMode::IntentionExclusive, table.oid).unwrap());
    let lm2 = std::sync::Arc::clone(lm);
    let t2c = std::sync::Arc::clone(&t2);
    let oid = table.oid;
    let waiter = std::thread::spawn(move || {
        lm2.lock_row(&t2c, stratadb::LockMode::Exclusive, oid, rid).unwrap()
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!waiter.is_finished());

    engine.transaction_manager().commit(&t1).unwrap();
    assert!(waiter.join().unwrap());
    assert!(t2.is_row_exclusive_locked(table.oid, rid));
    engine.transaction_manager().commit(&t2).unwrap();
}
