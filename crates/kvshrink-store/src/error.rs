use std::path::PathBuf;
use std::time::Duration;

use crate::path::ContainerPath;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed container does not exist.
    #[error("container not found: {0}")]
    NotFound(ContainerPath),

    /// A container or entry name was rejected.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The name is already taken by an item of the other kind (a value where a
    /// container was expected, or the reverse).
    #[error("incompatible value at {0}")]
    IncompatibleValue(ContainerPath),

    /// A mutation was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The store file stayed locked for longer than the open timeout.
    #[error("timed out after {timeout:?} waiting for lock on {}", .path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// I/O error outside of the storage engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the underlying storage engine.
    #[error("storage engine error: {0}")]
    Engine(#[from] redb::Error),
}

macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    Self::Engine(e.into())
                }
            }
        )*
    };
}

engine_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
