use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::names::validate_name;
use crate::path::{ContainerPath, Name};
use crate::traits::{Container, Store, Transaction};

#[derive(Clone, Debug, Default)]
struct Node {
    items: BTreeMap<Name, Item>,
}

#[derive(Clone, Debug)]
enum Item {
    Value(Vec<u8>),
    Container(Arc<Node>),
}

impl Node {
    fn entry_count(&self) -> usize {
        self.items
            .values()
            .map(|item| match item {
                Item::Value(_) => 1,
                Item::Container(child) => child.entry_count(),
            })
            .sum()
    }
}

/// Walk from `root` down to the container at `path`, cloning shared nodes on
/// the way so the result can be mutated.
fn locate_mut<'a>(root: &'a mut Node, path: &ContainerPath) -> StoreResult<&'a mut Node> {
    let mut node = root;
    for segment in path.segments() {
        node = match node.items.get_mut(segment) {
            Some(Item::Container(child)) => Arc::make_mut(child),
            _ => return Err(StoreError::NotFound(path.clone())),
        };
    }
    Ok(node)
}

/// In-memory, copy-on-write hierarchical store.
///
/// Intended for tests and embedding. The committed tree sits behind a
/// `RwLock`; read transactions take a cheap `Arc` snapshot of it, and the
/// single write transaction mutates a private copy that replaces the committed
/// tree on commit. Only the nodes on a modified path are ever cloned.
pub struct InMemoryStore {
    committed: RwLock<Arc<Node>>,
    writer: Mutex<()>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Node::default())),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<Node> {
        Arc::clone(&self.committed.read().expect("lock poisoned"))
    }

    /// Number of committed root containers.
    pub fn root_count(&self) -> usize {
        self.snapshot().items.len()
    }

    /// Number of committed entries across all containers.
    pub fn entry_count(&self) -> usize {
        self.snapshot().entry_count()
    }

    /// Returns `true` if the store has no root containers.
    pub fn is_empty(&self) -> bool {
        self.root_count() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("root_count", &self.root_count())
            .field("entry_count", &self.entry_count())
            .finish()
    }
}

impl Store for InMemoryStore {
    type Tx<'s> = MemoryTx<'s>;

    fn begin(&self, writable: bool) -> StoreResult<MemoryTx<'_>> {
        let writer = if writable {
            Some(self.writer.lock().expect("lock poisoned"))
        } else {
            None
        };
        // Snapshot after taking the writer lock so a writer always starts from
        // the latest commit.
        let root = RefCell::new(self.snapshot());
        Ok(MemoryTx {
            store: self,
            root,
            writer,
        })
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct MemoryTx<'s> {
    store: &'s InMemoryStore,
    root: RefCell<Arc<Node>>,
    writer: Option<MutexGuard<'s, ()>>,
}

impl<'s> MemoryTx<'s> {
    fn check_writable(&self) -> StoreResult<()> {
        if self.writer.is_some() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    /// Shared handle to the node at `path`, or `None` if it is missing.
    fn node(&self, path: &ContainerPath) -> Option<Arc<Node>> {
        let root = self.root.borrow();
        let mut node: &Arc<Node> = &root;
        for segment in path.segments() {
            match node.items.get(segment) {
                Some(Item::Container(child)) => node = child,
                _ => return None,
            }
        }
        Some(Arc::clone(node))
    }

    fn require_node(&self, path: &ContainerPath) -> StoreResult<Arc<Node>> {
        self.node(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    /// Apply `f` to the mutable node at `path`, or to the root node when
    /// `path` is `None`.
    fn mutate<T>(
        &self,
        path: Option<&ContainerPath>,
        f: impl FnOnce(&mut Node) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.check_writable()?;
        let mut root = self.root.borrow_mut();
        let root = Arc::make_mut(&mut root);
        match path {
            Some(path) => f(locate_mut(root, path)?),
            None => f(root),
        }
    }

    fn handle<'t>(&'t self, path: ContainerPath) -> MemoryContainer<'t, 's> {
        MemoryContainer { tx: self, path }
    }
}

/// Create `name` under `node` unless it already exists as a container.
fn ensure_child(node: &mut Node, name: &[u8], child_path: &ContainerPath) -> StoreResult<()> {
    match node.items.get(name) {
        Some(Item::Container(_)) => Ok(()),
        Some(Item::Value(_)) => Err(StoreError::IncompatibleValue(child_path.clone())),
        None => {
            node.items
                .insert(name.to_vec(), Item::Container(Arc::new(Node::default())));
            Ok(())
        }
    }
}

fn remove_child(node: &mut Node, name: &[u8], child_path: &ContainerPath) -> StoreResult<()> {
    match node.items.get(name) {
        Some(Item::Container(_)) => {
            node.items.remove(name);
            Ok(())
        }
        Some(Item::Value(_)) => Err(StoreError::IncompatibleValue(child_path.clone())),
        None => Err(StoreError::NotFound(child_path.clone())),
    }
}

impl<'s> Transaction for MemoryTx<'s> {
    type Container<'t> = MemoryContainer<'t, 's>
    where
        Self: 't;

    fn for_each_root<'t, E, F>(&'t self, mut f: F) -> Result<(), E>
    where
        Self: 't,
        F: FnMut(&[u8], Self::Container<'t>) -> Result<(), E>,
        E: From<StoreError>,
    {
        let root = Arc::clone(&self.root.borrow());
        for name in root.items.keys() {
            f(name.as_slice(), self.handle(ContainerPath::root(name.clone())))?;
        }
        Ok(())
    }

    fn root(&self, name: &[u8]) -> StoreResult<Option<MemoryContainer<'_, 's>>> {
        let path = ContainerPath::root(name);
        Ok(self.node(&path).map(|_| self.handle(path)))
    }

    fn create_root_if_missing(&self, name: &[u8]) -> StoreResult<MemoryContainer<'_, 's>> {
        validate_name(name)?;
        let path = ContainerPath::root(name);
        self.mutate(None, |root| ensure_child(root, name, &path))?;
        Ok(self.handle(path))
    }

    fn delete_root(&self, name: &[u8]) -> StoreResult<()> {
        let path = ContainerPath::root(name);
        self.mutate(None, |root| remove_child(root, name, &path))
    }

    fn commit(self) -> StoreResult<()> {
        let MemoryTx {
            store,
            root,
            writer,
        } = self;
        if writer.is_none() {
            return Err(StoreError::ReadOnly);
        }
        *store.committed.write().expect("lock poisoned") = root.into_inner();
        Ok(())
    }
}

/// Container handle inside a [`MemoryTx`].
pub struct MemoryContainer<'t, 's> {
    tx: &'t MemoryTx<'s>,
    path: ContainerPath,
}

impl<'t, 's> MemoryContainer<'t, 's> {
    /// Location of this container.
    pub fn path(&self) -> &ContainerPath {
        &self.path
    }
}

impl<'t, 's> Container for MemoryContainer<'t, 's> {
    fn child(&self, name: &[u8]) -> StoreResult<Option<Self>> {
        let node = self.tx.require_node(&self.path)?;
        match node.items.get(name) {
            Some(Item::Container(_)) => Ok(Some(self.tx.handle(self.path.child(name)))),
            _ => Ok(None),
        }
    }

    fn create_child_if_missing(&self, name: &[u8]) -> StoreResult<Self> {
        validate_name(name)?;
        let child = self.path.child(name);
        self.tx
            .mutate(Some(&self.path), |node| ensure_child(node, name, &child))?;
        Ok(self.tx.handle(child))
    }

    fn delete_child(&self, name: &[u8]) -> StoreResult<()> {
        let child = self.path.child(name);
        self.tx
            .mutate(Some(&self.path), |node| remove_child(node, name, &child))
    }

    fn for_each_after<E, F>(&self, after: Option<&[u8]>, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
        E: From<StoreError>,
    {
        let node = self.tx.require_node(&self.path)?;
        let lower = match after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        for (key, item) in node.items.range::<[u8], _>((lower, Bound::Unbounded)) {
            match item {
                Item::Value(value) => f(key, Some(value.as_slice()))?,
                Item::Container(_) => f(key, None)?,
            }
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let node = self.tx.require_node(&self.path)?;
        match node.items.get(key) {
            Some(Item::Value(value)) => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_name(key)?;
        let path = &self.path;
        self.tx.mutate(Some(path), |node| match node.items.get(key) {
            Some(Item::Container(_)) => Err(StoreError::IncompatibleValue(path.child(key))),
            _ => {
                node.items.insert(key.to_vec(), Item::Value(value.to_vec()));
                Ok(())
            }
        })
    }
}
