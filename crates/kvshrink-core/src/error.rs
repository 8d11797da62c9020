use std::path::PathBuf;

use kvshrink_store::{ContainerPath, StoreError};

/// Errors from a compaction, verification or survey pass.
#[derive(Debug, thiserror::Error)]
pub enum CompactError {
    /// The caller passed unusable paths.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A store file could not be opened.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    /// A container the walk expected to find is gone.
    #[error("container not found: {0}")]
    NotFound(ContainerPath),

    /// Copying an entry into the destination failed. Entries copied before it
    /// stay in the destination.
    #[error("failed to write {path}: {source}")]
    Write {
        path: ContainerPath,
        #[source]
        source: StoreError,
    },

    /// The irreversible operation was not explicitly enabled.
    #[error("compaction is experimental and irreversible: set danger_zone = \"enabled\" to proceed")]
    SafetyGate,

    /// Reading a container failed.
    #[error("failed to read {path}: {source}")]
    Read {
        path: ContainerPath,
        #[source]
        source: StoreError,
    },

    /// An entry path has no enclosing container.
    #[error("entry path {0} has no enclosing container")]
    InvalidEntryPath(ContainerPath),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine failure not tied to a particular container.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for compaction operations.
pub type Result<T> = std::result::Result<T, CompactError>;
