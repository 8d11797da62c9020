//! Hierarchical key-value storage seam for kvshrink.
//!
//! The compaction core never touches pages or files. Everything it needs from
//! a storage engine is expressed by three traits:
//!
//! - [`Store`] -- an opened database; hands out read and write transactions
//! - [`Transaction`] -- a snapshot (read) or an atomic unit of mutation (write)
//!   that exposes the root containers
//! - [`Container`] -- a named node holding child containers and entries
//!
//! Locations inside a store are addressed with [`ContainerPath`].
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- copy-on-write tree for tests and embedding
//! - [`RedbStore`] -- file-backed store on top of the `redb` engine
//!
//! # Design Rules
//!
//! 1. Within one container a name is either a child container or an entry,
//!    never both.
//! 2. Container and entry names are never empty.
//! 3. Containers are enumerated in ascending lexicographic byte order.
//! 4. A read transaction sees one consistent snapshot for its whole lifetime.
//! 5. At most one write transaction is live per store.
//! 6. All engine errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod names;
pub mod options;
pub mod path;
pub mod redb_store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use names::{validate_name, MAX_NAME_LEN};
pub use options::OpenOptions;
pub use path::{ContainerPath, Name};
pub use redb_store::RedbStore;
pub use traits::{Container, Store, Transaction};
