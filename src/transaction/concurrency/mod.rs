pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;

pub use lock_manager::{AbortReason, LockManager, LockMode, TransactionAbort};
pub use transaction::{
    IndexWriteRecord, IsolationLevel, Transaction, TransactionState, WriteType,
};
pub use transaction_manager::{TransactionError, TransactionManager};
