//! Persistence errors

use thiserror::Error;

/// Errors from the save pipeline and its stores
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The store refused the write (used by test stores)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Save queue is shut down")]
    QueueClosed,
}

pub type PersistResult<T> = Result<T, PersistError>;
