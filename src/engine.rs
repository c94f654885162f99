use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::Catalog;
use crate::common::config::DbConfig;
use crate::query::executor::ExecutorContext;
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::transaction::concurrency::{
    IsolationLevel, LockManager, Transaction, TransactionManager,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Disk manager error: {0}")]
    Disk(#[from] DiskManagerError),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),
}

/// The single owning object of the storage core: configuration, pager,
/// buffer pool, catalog, lock manager (with its detector thread) and
/// transaction manager are created together at startup and torn down
/// together at shutdown. No process-wide state.
pub struct Engine {
    config: DbConfig,
    buffer_pool: Arc<BufferPoolManager>,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    transaction_manager: Arc<TransactionManager>,
}

impl Engine {
    pub fn new(config: DbConfig, db_path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let disk = Arc::new(DiskManager::new(db_path)?);
        let buffer_pool = Arc::new(BufferPoolManager::new(
            config.pool_size,
            config.replacer_k,
            config.bucket_size,
            disk,
        ));
        let catalog = Arc::new(Catalog::new(
            Arc::clone(&buffer_pool),
            config.leaf_max_size,
            config.internal_max_size,
        ));

        let lock_manager = Arc::new(LockManager::new(config.cycle_detection_interval));
        lock_manager.start_cycle_detection();

        let transaction_manager = Arc::new(TransactionManager::new(
            Arc::clone(&lock_manager),
            Arc::clone(&catalog),
        ));

        log::info!(
            "engine up: pool {} frames, replacer k={}, detector every {:?}",
            config.pool_size,
            config.replacer_k,
            config.cycle_detection_interval
        );

        Ok(Self {
            config,
            buffer_pool,
            catalog,
            lock_manager,
            transaction_manager,
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.buffer_pool
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.transaction_manager
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        self.transaction_manager.begin(isolation_level)
    }

    /// Execution context bound to one transaction
    pub fn executor_context(&self, txn: Arc<Transaction>) -> ExecutorContext {
        ExecutorContext::new(
            txn,
            Arc::clone(&self.lock_manager),
            Arc::clone(&self.catalog),
        )
    }

    /// Stop the deadlock detector and flush every resident page
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.lock_manager.stop_cycle_detection();
        self.buffer_pool.flush_all_pages()?;
        log::info!("engine shut down");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("shutdown during drop failed: {}", e);
        }
    }
}
