use thiserror::Error;

use crate::common::types::TxnId;
use crate::index::btree::BTreeError;
use crate::storage::table::HeapError;
use crate::transaction::concurrency::TransactionAbort;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Lock request failed: {0}")]
    Lock(#[from] TransactionAbort),

    #[error("Transaction {0} was aborted while waiting for a lock")]
    AbortedWhileWaiting(TxnId),

    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("Index error: {0}")]
    Index(#[from] BTreeError),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),
}
