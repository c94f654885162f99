use thiserror::Error;

use crate::storage::buffer::BufferPoolError;
use crate::storage::page::PageError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Node too large for page")]
    NodeTooLarge,

    #[error("Tree structure is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("Buffer pool exhausted")]
    PoolExhausted,

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),
}
