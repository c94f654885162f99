use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Not enough free space in page")]
    InsufficientSpace,

    #[error("Invalid slot index: {0}")]
    InvalidSlot(u32),

    #[error("Record not found")]
    RecordNotFound,

    #[error("Tuple of {0} bytes does not fit in a page")]
    TupleTooLarge(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}
