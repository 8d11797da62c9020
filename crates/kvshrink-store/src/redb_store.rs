//! File-backed store on top of the `redb` embedded database.
//!
//! redb offers a flat namespace of tables. Each container maps to one table
//! holding the container's entries; the table name is the container path with
//! every segment hex-encoded and segments joined by `/`:
//!
//! ```text
//! names/first/american  ->  "6e616d6573/6669727374/616d65726963616e"
//! ```
//!
//! Which containers exist, and how they nest, is recorded in a separate
//! directory table. Its keys are the container depth (big-endian `u32`)
//! followed by every segment escaped and terminated. The encoding sorts like
//! the segment lists it encodes, so the children of a container form one
//! contiguous, name-ordered key range, and existence checks are point
//! lookups.

use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use redb::{Database, DatabaseError, ReadableTable, TableDefinition, TableError};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::names::validate_name;
use crate::options::OpenOptions;
use crate::path::{ContainerPath, Name};
use crate::traits::{Container, Store, Transaction};

type EntryTable<'n> = TableDefinition<'n, &'static [u8], &'static [u8]>;

const DIRECTORY: TableDefinition<&[u8], ()> = TableDefinition::new("kvshrink.directory");

const SEPARATOR: char = '/';

/// redb table name for the container at `path`.
fn table_name(path: &ContainerPath) -> String {
    let mut name = String::new();
    for (i, segment) in path.segments().iter().enumerate() {
        if i > 0 {
            name.push(SEPARATOR);
        }
        name.push_str(&hex::encode(segment));
    }
    name
}

/// Append `segment` with `0x00` escaped as `00 ff` and terminated by `00 01`.
fn encode_segment(key: &mut Vec<u8>, segment: &[u8]) {
    for &b in segment {
        if b == 0 {
            key.extend_from_slice(&[0x00, 0xff]);
        } else {
            key.push(b);
        }
    }
    key.extend_from_slice(&[0x00, 0x01]);
}

/// Inverse of [`encode_segment`] for a single encoded segment.
fn decode_segment(encoded: &[u8]) -> Name {
    let mut name = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.iter().copied();
    while let Some(b) = bytes.next() {
        if b != 0 {
            name.push(b);
            continue;
        }
        match bytes.next() {
            Some(0xff) => name.push(0),
            _ => break,
        }
    }
    name
}

fn directory_prefix(depth: usize, segments: &[Name]) -> Vec<u8> {
    // Names are capped well below u32::MAX bytes, and so is any real depth.
    let mut key = (depth as u32).to_be_bytes().to_vec();
    for segment in segments {
        encode_segment(&mut key, segment);
    }
    key
}

/// Directory key of the container at `path`.
fn directory_key(path: &ContainerPath) -> Vec<u8> {
    directory_prefix(path.depth(), path.segments())
}

/// Common prefix of the directory keys of every direct child of `parent`
/// (or of every root container when `parent` is `None`).
fn children_prefix(parent: Option<&ContainerPath>) -> Vec<u8> {
    match parent {
        Some(parent) => directory_prefix(parent.depth() + 1, parent.segments()),
        None => directory_prefix(1, &[]),
    }
}

fn table_error(e: TableError, path: &ContainerPath) -> StoreError {
    match e {
        TableError::TableDoesNotExist(_) => StoreError::NotFound(path.clone()),
        other => other.into(),
    }
}

fn directory_contains<T>(directory: &T, key: &[u8]) -> StoreResult<bool>
where
    T: ReadableTable<&'static [u8], ()>,
{
    let found = directory.get(key)?.is_some();
    Ok(found)
}

/// Names of the children whose directory keys start with `prefix`, in order.
fn directory_children<T>(directory: &T, prefix: &[u8]) -> StoreResult<Vec<Name>>
where
    T: ReadableTable<&'static [u8], ()>,
{
    let mut names = Vec::new();
    let range = children_range(prefix, None);
    for row in directory.range::<&[u8]>(range.as_bounds())? {
        let (key, _) = row?;
        match key.value().strip_prefix(prefix) {
            Some(encoded) => names.push(decode_segment(encoded)),
            None => break,
        }
    }
    Ok(names)
}

/// Lower bound of a directory scan over one container's children.
struct ChildrenRange {
    start: Vec<u8>,
    inclusive: bool,
}

impl ChildrenRange {
    fn as_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let start = if self.inclusive {
            Bound::Included(self.start.as_slice())
        } else {
            Bound::Excluded(self.start.as_slice())
        };
        (start, Bound::Unbounded)
    }
}

fn children_range(prefix: &[u8], after: Option<&[u8]>) -> ChildrenRange {
    match after {
        Some(after) => {
            let mut start = prefix.to_vec();
            encode_segment(&mut start, after);
            ChildrenRange {
                start,
                inclusive: false,
            }
        }
        None => ChildrenRange {
            start: prefix.to_vec(),
            inclusive: true,
        },
    }
}

/// Visit the rows of `entries` merged with the child containers listed under
/// `prefix` in `directory`, in ascending key order, starting after `after`.
///
/// Both sides are read lazily, so stopping early costs nothing for the rest
/// of the container.
fn merge_scan<T, D, E, F>(
    entries: &T,
    directory: &D,
    prefix: &[u8],
    after: Option<&[u8]>,
    f: &mut F,
) -> Result<(), E>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
    D: ReadableTable<&'static [u8], ()>,
    F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
    E: From<StoreError>,
{
    let range = children_range(prefix, after);
    let mut children = directory.range::<&[u8]>(range.as_bounds()).map_err(StoreError::from)?;
    let mut next_child = || -> StoreResult<Option<Name>> {
        match children.next() {
            Some(row) => {
                let (key, _) = row?;
                Ok(key.value().strip_prefix(prefix).map(decode_segment))
            }
            None => Ok(None),
        }
    };
    let mut child = next_child()?;

    let lower = match after {
        Some(after) => Bound::Excluded(after),
        None => Bound::Unbounded,
    };
    for row in entries
        .range::<&[u8]>((lower, Bound::Unbounded))
        .map_err(StoreError::from)?
    {
        let (key_guard, value_guard) = row.map_err(StoreError::from)?;
        let key = key_guard.value();
        while let Some(name) = child.as_deref().filter(|name| *name < key) {
            f(name, None)?;
            child = next_child()?;
        }
        f(key, Some(value_guard.value()))?;
    }
    while let Some(name) = child {
        f(&name, None)?;
        child = next_child()?;
    }
    Ok(())
}

/// A redb database file opened as a hierarchical store.
///
/// The database is closed when the handle is dropped.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Open the store file at `path`.
    ///
    /// While another handle holds the file lock the open is retried every
    /// `options.poll_interval`; after `options.timeout` it fails with
    /// [`StoreError::LockTimeout`].
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> StoreResult<Self> {
        let path = path.as_ref();
        let started = Instant::now();
        let mut waiting = false;
        loop {
            let attempt = if options.create {
                Database::create(path)
            } else {
                Database::open(path)
            };
            match attempt {
                Ok(db) => {
                    debug!(
                        path = %path.display(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "opened store"
                    );
                    return Ok(Self {
                        db,
                        path: path.to_path_buf(),
                    });
                }
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    if started.elapsed() >= options.timeout {
                        return Err(StoreError::LockTimeout {
                            path: path.to_path_buf(),
                            timeout: options.timeout,
                        });
                    }
                    if !waiting {
                        warn!(path = %path.display(), "store is locked, waiting");
                        waiting = true;
                    }
                    thread::sleep(options.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RedbStore {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "closing store");
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish()
    }
}

impl Store for RedbStore {
    type Tx<'s> = RedbTx;

    fn begin(&self, writable: bool) -> StoreResult<RedbTx> {
        let inner = if writable {
            TxInner::Write(self.db.begin_write()?)
        } else {
            TxInner::Read(self.db.begin_read()?)
        };
        Ok(RedbTx { inner })
    }
}

enum TxInner {
    Read(redb::ReadTransaction),
    Write(redb::WriteTransaction),
}

/// Transaction over a [`RedbStore`].
pub struct RedbTx {
    inner: TxInner,
}

impl RedbTx {
    fn write_tx(&self) -> StoreResult<&redb::WriteTransaction> {
        match &self.inner {
            TxInner::Write(tx) => Ok(tx),
            TxInner::Read(_) => Err(StoreError::ReadOnly),
        }
    }

    fn exists(&self, path: &ContainerPath) -> StoreResult<bool> {
        let key = directory_key(path);
        match &self.inner {
            // A store that never had a container has no directory yet.
            TxInner::Read(tx) => match tx.open_table(DIRECTORY) {
                Ok(directory) => directory_contains(&directory, &key),
                Err(TableError::TableDoesNotExist(_)) => Ok(false),
                Err(e) => Err(e.into()),
            },
            TxInner::Write(tx) => directory_contains(&tx.open_table(DIRECTORY)?, &key),
        }
    }

    fn require(&self, path: &ContainerPath) -> StoreResult<()> {
        if self.exists(path)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(path.clone()))
        }
    }

    /// Sorted names of the containers directly beneath `parent` (or of the
    /// root containers when `parent` is `None`).
    fn children(&self, parent: Option<&ContainerPath>) -> StoreResult<Vec<Name>> {
        let prefix = children_prefix(parent);
        match &self.inner {
            TxInner::Read(tx) => match tx.open_table(DIRECTORY) {
                Ok(directory) => directory_children(&directory, &prefix),
                Err(TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            },
            TxInner::Write(tx) => directory_children(&tx.open_table(DIRECTORY)?, &prefix),
        }
    }

    fn get(&self, path: &ContainerPath, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let name = table_name(path);
        match &self.inner {
            TxInner::Read(tx) => {
                let table = tx
                    .open_table(EntryTable::new(&name))
                    .map_err(|e| table_error(e, path))?;
                let value = table.get(key)?.map(|v| v.value().to_vec());
                Ok(value)
            }
            TxInner::Write(tx) => {
                self.require(path)?;
                let table = tx.open_table(EntryTable::new(&name))?;
                let value = table.get(key)?.map(|v| v.value().to_vec());
                Ok(value)
            }
        }
    }

    fn put(&self, path: &ContainerPath, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let tx = self.write_tx()?;
        validate_name(key)?;
        self.require(path)?;
        let target = path.child(key);
        if self.exists(&target)? {
            return Err(StoreError::IncompatibleValue(target));
        }
        let name = table_name(path);
        let mut table = tx.open_table(EntryTable::new(&name))?;
        table.insert(key, value)?;
        Ok(())
    }

    fn create(&self, parent: Option<&ContainerPath>, name: &[u8]) -> StoreResult<ContainerPath> {
        let tx = self.write_tx()?;
        validate_name(name)?;
        let child = match parent {
            Some(parent) => {
                let child = parent.child(name);
                if self.get(parent, name)?.is_some() {
                    return Err(StoreError::IncompatibleValue(child));
                }
                child
            }
            None => ContainerPath::root(name),
        };
        if !self.exists(&child)? {
            tx.open_table(DIRECTORY)?
                .insert(directory_key(&child).as_slice(), ())?;
            tx.open_table(EntryTable::new(&table_name(&child)))?;
        }
        Ok(child)
    }

    fn delete(&self, path: &ContainerPath) -> StoreResult<()> {
        let tx = self.write_tx()?;
        if !self.exists(path)? {
            if let Some(parent) = path.parent() {
                if self.exists(&parent)? && self.get(&parent, path.last())?.is_some() {
                    return Err(StoreError::IncompatibleValue(path.clone()));
                }
            }
            return Err(StoreError::NotFound(path.clone()));
        }

        let mut doomed = Vec::new();
        let mut pending = vec![path.clone()];
        while let Some(p) = pending.pop() {
            for name in self.children(Some(&p))? {
                pending.push(p.child(name));
            }
            doomed.push(p);
        }

        let mut directory = tx.open_table(DIRECTORY)?;
        for p in &doomed {
            directory.remove(directory_key(p).as_slice())?;
            tx.delete_table(EntryTable::new(&table_name(p)))?;
        }
        Ok(())
    }

    fn scan<E, F>(&self, path: &ContainerPath, after: Option<&[u8]>, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
        E: From<StoreError>,
    {
        let prefix = children_prefix(Some(path));
        let name = table_name(path);
        match &self.inner {
            TxInner::Read(tx) => {
                let entries = tx
                    .open_table(EntryTable::new(&name))
                    .map_err(|e| table_error(e, path))?;
                let directory = tx.open_table(DIRECTORY).map_err(|e| table_error(e, path))?;
                merge_scan(&entries, &directory, &prefix, after, f)
            }
            TxInner::Write(tx) => {
                self.require(path)?;
                let entries = tx
                    .open_table(EntryTable::new(&name))
                    .map_err(StoreError::from)?;
                let directory = tx.open_table(DIRECTORY).map_err(StoreError::from)?;
                merge_scan(&entries, &directory, &prefix, after, f)
            }
        }
    }

    fn handle(&self, path: ContainerPath) -> RedbContainer<'_> {
        RedbContainer { tx: self, path }
    }
}

impl Transaction for RedbTx {
    type Container<'t> = RedbContainer<'t>;

    fn for_each_root<'t, E, F>(&'t self, mut f: F) -> Result<(), E>
    where
        Self: 't,
        F: FnMut(&[u8], Self::Container<'t>) -> Result<(), E>,
        E: From<StoreError>,
    {
        for name in self.children(None)? {
            let handle = self.handle(ContainerPath::root(name.clone()));
            f(name.as_slice(), handle)?;
        }
        Ok(())
    }

    fn root(&self, name: &[u8]) -> StoreResult<Option<RedbContainer<'_>>> {
        let path = ContainerPath::root(name);
        if self.exists(&path)? {
            Ok(Some(self.handle(path)))
        } else {
            Ok(None)
        }
    }

    fn create_root_if_missing(&self, name: &[u8]) -> StoreResult<RedbContainer<'_>> {
        let path = self.create(None, name)?;
        Ok(self.handle(path))
    }

    fn delete_root(&self, name: &[u8]) -> StoreResult<()> {
        self.delete(&ContainerPath::root(name))
    }

    fn commit(self) -> StoreResult<()> {
        match self.inner {
            TxInner::Write(tx) => Ok(tx.commit()?),
            TxInner::Read(_) => Err(StoreError::ReadOnly),
        }
    }
}

/// Container handle inside a [`RedbTx`].
pub struct RedbContainer<'t> {
    tx: &'t RedbTx,
    path: ContainerPath,
}

impl<'t> RedbContainer<'t> {
    /// Location of this container.
    pub fn path(&self) -> &ContainerPath {
        &self.path
    }
}

impl<'t> Container for RedbContainer<'t> {
    fn child(&self, name: &[u8]) -> StoreResult<Option<Self>> {
        let path = self.path.child(name);
        if self.tx.exists(&path)? {
            Ok(Some(self.tx.handle(path)))
        } else {
            Ok(None)
        }
    }

    fn create_child_if_missing(&self, name: &[u8]) -> StoreResult<Self> {
        let path = self.tx.create(Some(&self.path), name)?;
        Ok(self.tx.handle(path))
    }

    fn delete_child(&self, name: &[u8]) -> StoreResult<()> {
        self.tx.delete(&self.path.child(name))
    }

    fn for_each_after<E, F>(&self, after: Option<&[u8]>, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
        E: From<StoreError>,
    {
        self.tx.scan(&self.path, after, &mut f)
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.tx.get(&self.path, key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.tx.put(&self.path, key, value)
    }
}
