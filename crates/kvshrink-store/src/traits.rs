//! The storage engine seam.
//!
//! Any backend (in-memory, file-backed) implements these traits to serve as a
//! compaction source or destination.

use crate::error::{StoreError, StoreResult};
use crate::path::Name;

/// An opened hierarchical key-value database.
///
/// Implementations allow many concurrent readers and a single writer. A read
/// transaction observes one consistent snapshot for as long as it lives.
pub trait Store {
    /// Transaction type, borrowing the store for its lifetime.
    type Tx<'s>: Transaction
    where
        Self: 's;

    /// Begin a transaction. Write transactions block until the current writer
    /// (if any) finishes.
    fn begin(&self, writable: bool) -> StoreResult<Self::Tx<'_>>;

    /// Run `f` inside a read transaction.
    ///
    /// The transaction is released when `f` returns, whatever the outcome.
    fn view<'s, T, E, F>(&'s self, f: F) -> Result<T, E>
    where
        Self: 's,
        F: FnOnce(&Self::Tx<'s>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.begin(false)?;
        f(&tx)
    }

    /// Run `f` inside a write transaction and commit if it succeeds.
    ///
    /// When `f` fails the transaction is dropped without committing, which
    /// rolls back everything it did.
    fn update<'s, T, E, F>(&'s self, f: F) -> Result<T, E>
    where
        Self: 's,
        F: FnOnce(&Self::Tx<'s>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.begin(true)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// A read snapshot or an atomic unit of mutation.
///
/// Dropping a write transaction without calling [`Transaction::commit`] rolls
/// it back.
pub trait Transaction: Sized {
    /// Container handle type, borrowing the transaction.
    type Container<'t>: Container
    where
        Self: 't;

    /// Visit every root container in ascending name order.
    ///
    /// Stops at the first error returned by `f`.
    fn for_each_root<'t, E, F>(&'t self, f: F) -> Result<(), E>
    where
        Self: 't,
        F: FnMut(&[u8], Self::Container<'t>) -> Result<(), E>,
        E: From<StoreError>;

    /// Names of all root containers in ascending order.
    fn root_names(&self) -> StoreResult<Vec<Name>> {
        let mut names = Vec::new();
        self.for_each_root(|name, _| {
            names.push(name.to_vec());
            Ok::<_, StoreError>(())
        })?;
        Ok(names)
    }

    /// The root container `name`, if it exists.
    fn root(&self, name: &[u8]) -> StoreResult<Option<Self::Container<'_>>>;

    /// The root container `name`, creating it when missing.
    fn create_root_if_missing(&self, name: &[u8]) -> StoreResult<Self::Container<'_>>;

    /// Delete the root container `name` and everything beneath it.
    fn delete_root(&self, name: &[u8]) -> StoreResult<()>;

    /// Make every change of this transaction durable.
    fn commit(self) -> StoreResult<()>;
}

/// A named node holding child containers and entries.
pub trait Container: Sized {
    /// The child container `name`, if it exists.
    fn child(&self, name: &[u8]) -> StoreResult<Option<Self>>;

    /// The child container `name`, creating it when missing.
    ///
    /// Fails with [`StoreError::IncompatibleValue`] when `name` holds an entry.
    fn create_child_if_missing(&self, name: &[u8]) -> StoreResult<Self>;

    /// Delete the child container `name` and everything beneath it.
    fn delete_child(&self, name: &[u8]) -> StoreResult<()>;

    /// Visit every item in ascending key order.
    ///
    /// Entries are passed as `(key, Some(value))`; child containers as
    /// `(name, None)`. Stops at the first error returned by `f`. Mutating this
    /// same container from inside `f` is not supported.
    fn for_each<E, F>(&self, f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
        E: From<StoreError>,
    {
        self.for_each_after(None, f)
    }

    /// Like [`Container::for_each`], but only items whose key sorts strictly
    /// after `after`.
    fn for_each_after<E, F>(&self, after: Option<&[u8]>, f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
        E: From<StoreError>;

    /// The value stored under `key`. Child containers read as `None`.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or overwrite the entry `key`.
    ///
    /// Fails with [`StoreError::IncompatibleValue`] when `key` names a child
    /// container.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;
}
