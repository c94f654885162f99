mod common;

use anyhow::Result;
use common::{setup, tuple_with_key};
use stratadb::common::types::Rid;
use stratadb::{BPlusTree, DbConfig, Engine, IsolationLevel};
use tempfile::TempDir;

#[test]
fn test_engine_starts_and_shuts_down() -> Result<()> {
    setup();
    let dir = TempDir::new()?;
    let engine = Engine::new(DbConfig::default(), dir.path().join("test.db"))?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    assert_eq!(txn.id(), 1);
    let txn2 = engine.begin(IsolationLevel::ReadCommitted);
    assert_eq!(txn2.id(), 2, "transaction ids are monotonic");

    engine.transaction_manager().commit(&txn)?;
    engine.transaction_manager().commit(&txn2)?;
    engine.shutdown()?;
    Ok(())
}

#[test]
fn test_index_root_survives_restart() -> Result<()> {
    setup();
    let dir = TempDir::new()?;
    let path = dir.path().join("test.db");

    {
        let engine = Engine::new(DbConfig::default(), &path)?;
        let tree: BPlusTree<i64> =
            BPlusTree::new("pk_users", std::sync::Arc::clone(engine.buffer_pool()), 4, 4)?;
        for key in 1..=50 {
            tree.insert(key, Rid::new(key as u32 + 1000, 0))?;
        }
        engine.shutdown()?;
    }

    // A fresh engine over the same file finds the root through the header
    // page and serves every key from disk
    let engine = Engine::new(DbConfig::default(), &path)?;
    let tree: BPlusTree<i64> =
        BPlusTree::new("pk_users", std::sync::Arc::clone(engine.buffer_pool()), 4, 4)?;
    assert!(!tree.is_empty());
    for key in 1..=50 {
        assert_eq!(tree.get_value(&key)?, vec![Rid::new(key as u32 + 1000, 0)]);
    }
    tree.check_integrity()?;
    engine.shutdown()?;
    Ok(())
}

#[test]
fn test_catalog_index_backfills_existing_rows() -> Result<()> {
    setup();
    let dir = TempDir::new()?;
    let engine = Engine::new(DbConfig::default(), dir.path().join("test.db"))?;

    let table = engine.catalog().create_table("logs")?;
    let mut rids = Vec::new();
    for key in [4i64, 8, 15, 16, 23, 42] {
        rids.push(table.heap.insert_tuple(&tuple_with_key(key, 0))?);
    }

    // The index is created after the fact and picks the rows up
    let info = engine.catalog().create_index("logs", "pk_logs")?;
    for (i, key) in [4i64, 8, 15, 16, 23, 42].iter().enumerate() {
        assert_eq!(info.index.get_value(key)?, vec![rids[i]], "key {}", key);
    }
    engine.shutdown()?;
    Ok(())
}

#[test]
fn test_duplicate_table_and_index_names_rejected() -> Result<()> {
    setup();
    let dir = TempDir::new()?;
    let engine = Engine::new(DbConfig::default(), dir.path().join("test.db"))?;

    engine.catalog().create_table("t")?;
    assert!(engine.catalog().create_table("t").is_err());

    engine.catalog().create_index("t", "i")?;
    assert!(engine.catalog().create_index("t", "i").is_err());
    assert!(engine.catalog().create_index("missing", "j").is_err());
    engine.shutdown()?;
    Ok(())
}
