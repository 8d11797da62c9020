//! Fixtures shared by the unit tests of this crate.

use kvshrink_store::{Container, ContainerPath, Store, StoreError, Transaction};

use crate::error::Result;
use crate::resolve::resolve;
use crate::walker::EntrySink;

/// Render a path as `a/b/c`.
pub fn slash(path: &ContainerPath) -> String {
    path.segments()
        .iter()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `(path, value)` pairs into `store` in one transaction, creating
/// containers along the way.
pub fn seed<S: Store>(store: &S, entries: &[(&str, &[u8])]) {
    store
        .update(|tx| {
            for (path, value) in entries {
                let path = ContainerPath::parse(path)?;
                let (parent, key) = path.split_last();
                let parent = parent.expect("entry paths need a container");
                resolve(tx, &parent, true)?
                    .expect("created")
                    .put(key, value)?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
}

/// Every entry in `store`, zero-length values included, in walk order.
pub fn dump<S: Store>(store: &S) -> Vec<(String, Vec<u8>)> {
    fn visit<C: Container>(
        container: &C,
        path: &ContainerPath,
        out: &mut Vec<(String, Vec<u8>)>,
    ) -> std::result::Result<(), StoreError> {
        let mut items = Vec::new();
        container.for_each(|key, value| {
            items.push((key.to_vec(), value.map(<[u8]>::to_vec)));
            Ok::<_, StoreError>(())
        })?;
        for (key, value) in items {
            match value {
                Some(value) => out.push((slash(&path.child(&key)), value)),
                None => {
                    let child = container.child(&key)?.expect("listed child exists");
                    visit(&child, &path.child(&key), out)?;
                }
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    store
        .view(|tx| {
            tx.for_each_root(|name, root| visit(&root, &ContainerPath::root(name), &mut out))
        })
        .unwrap();
    out
}

/// Sink that records what it is handed.
#[derive(Default)]
pub struct Collect {
    pub entries: Vec<(String, Vec<u8>)>,
}

impl EntrySink for Collect {
    fn entry(&mut self, path: &ContainerPath, value: &[u8]) -> Result<()> {
        self.entries.push((slash(path), value.to_vec()));
        Ok(())
    }
}
