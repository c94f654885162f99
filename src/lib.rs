// Export public modules
pub mod catalog;
pub mod common;
pub mod container;
pub mod engine;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use common::config::DbConfig;
pub use container::ExtendibleHashTable;
pub use engine::Engine;
pub use index::BPlusTree;
pub use storage::buffer::{BufferPoolError, BufferPoolManager, LruKReplacer};
pub use transaction::concurrency::{
    IsolationLevel, LockManager, LockMode, Transaction, TransactionManager,
};
