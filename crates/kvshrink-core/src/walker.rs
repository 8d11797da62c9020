//! Depth-first enumeration of a source store inside one read transaction.

use kvshrink_store::{Container, ContainerPath, Name, StoreError, Transaction};
use tracing::{debug, trace};

use crate::error::{CompactError, Result};
use crate::report::WalkStats;
use crate::resolve::resolve;

/// Receives every non-empty leaf entry found by a [`TreeWalker`].
pub trait EntrySink {
    /// Handle the entry at `path`. An error aborts the walk.
    fn entry(&mut self, path: &ContainerPath, value: &[u8]) -> Result<()>;
}

/// Why a container scan stopped early.
enum Halt {
    /// The scan reached a child container that must be walked first.
    Descend(Name),
    Store(StoreError),
    Sink(CompactError),
}

impl From<StoreError> for Halt {
    fn from(e: StoreError) -> Self {
        Halt::Store(e)
    }
}

/// A container on the walk stack and the key its scan resumes after.
struct Frame<C> {
    container: C,
    path: ContainerPath,
    after: Option<Name>,
}

/// Walks containers of one transaction and feeds their entries to a sink.
///
/// The walk is pre-order: every container's items are taken in ascending key
/// order, and a child container is walked completely when its name comes up,
/// before the entries that sort after it. Suspended containers live on an
/// explicit stack together with the key to resume after, so the depth of the
/// hierarchy is bounded by memory rather than by the call stack.
/// Zero-length values are skipped.
pub struct TreeWalker<'t, T> {
    tx: &'t T,
    stats: WalkStats,
}

impl<'t, T: Transaction> TreeWalker<'t, T> {
    pub fn new(tx: &'t T) -> Self {
        Self {
            tx,
            stats: WalkStats::default(),
        }
    }

    /// Walk the container at `base` and everything beneath it.
    ///
    /// Stops at the first error, whether raised by the store or by `sink`.
    pub fn walk<S: EntrySink>(&mut self, base: ContainerPath, sink: &mut S) -> Result<()> {
        let container = resolve(self.tx, &base, false)
            .map_err(|source| CompactError::Read {
                path: base.clone(),
                source,
            })?
            .ok_or_else(|| CompactError::NotFound(base.clone()))?;
        let mut pending = vec![Frame {
            container,
            path: base,
            after: None,
        }];

        while let Some(Frame {
            container,
            path,
            after,
        }) = pending.pop()
        {
            if after.is_none() {
                self.stats.containers += 1;
                self.stats.max_depth = self.stats.max_depth.max(path.depth());
                debug!(container = %path, "walking container");
            }

            let stats = &mut self.stats;
            let scanned = container.for_each_after(after.as_deref(), |key, value| {
                match value {
                    None => return Err(Halt::Descend(key.to_vec())),
                    Some([]) => {
                        stats.skipped_empty += 1;
                        debug!(entry = %path.child(key), "skipping zero-length entry");
                    }
                    Some(value) => {
                        let entry = path.child(key);
                        trace!(entry = %entry, len = value.len(), "entry");
                        sink.entry(&entry, value).map_err(Halt::Sink)?;
                        stats.entries += 1;
                        stats.bytes += value.len() as u64;
                    }
                }
                Ok::<_, Halt>(())
            });
            match scanned {
                Ok(()) => {}
                Err(Halt::Descend(name)) => {
                    let child_path = path.child(&name);
                    let child = container
                        .child(&name)
                        .map_err(|source| CompactError::Read {
                            path: child_path.clone(),
                            source,
                        })?
                        .ok_or_else(|| CompactError::NotFound(child_path.clone()))?;
                    pending.push(Frame {
                        container,
                        path,
                        after: Some(name),
                    });
                    pending.push(Frame {
                        container: child,
                        path: child_path,
                        after: None,
                    });
                }
                Err(Halt::Store(source)) => return Err(CompactError::Read { path, source }),
                Err(Halt::Sink(e)) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    pub fn into_stats(self) -> WalkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed, Collect};
    use kvshrink_store::{InMemoryStore, Store};

    fn walk_all(store: &InMemoryStore) -> (Vec<(String, Vec<u8>)>, WalkStats) {
        let mut sink = Collect::default();
        let stats = store
            .view(|tx| {
                let mut walker = TreeWalker::new(tx);
                for name in tx.root_names()? {
                    walker.walk(ContainerPath::root(name), &mut sink)?;
                }
                Ok::<_, CompactError>(walker.into_stats())
            })
            .unwrap();
        (sink.entries, stats)
    }

    #[test]
    fn descends_into_children_as_their_keys_come_up() {
        let store = InMemoryStore::new();
        seed(
            &store,
            &[
                ("r/b/x", b"1"),
                ("r/z", b"2"),
                ("r/a/y", b"3"),
                ("r/m", b"4"),
                ("r/a/c/d", b"5"),
                ("r/a/b", b"6"),
            ],
        );

        let (entries, stats) = walk_all(&store);
        let paths: Vec<&str> = entries.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["r/a/b", "r/a/c/d", "r/a/y", "r/b/x", "r/m", "r/z"]
        );
        assert_eq!(stats.containers, 4);
        assert_eq!(stats.entries, 6);
        assert_eq!(stats.max_depth, 3);
    }

    #[test]
    fn skips_zero_length_values() {
        let store = InMemoryStore::new();
        seed(&store, &[("r/empty", b""), ("r/full", b"abc"), ("r/c/empty", b"")]);

        let (entries, stats) = walk_all(&store);
        assert_eq!(entries, vec![("r/full".to_string(), b"abc".to_vec())]);
        assert_eq!(stats.skipped_empty, 2);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, 3);
    }

    #[test]
    fn empty_containers_are_visited_but_emit_nothing() {
        let store = InMemoryStore::new();
        store
            .update(|tx| {
                tx.create_root_if_missing(b"r")?
                    .create_child_if_missing(b"hollow")?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let (entries, stats) = walk_all(&store);
        assert!(entries.is_empty());
        assert_eq!(stats.containers, 2);
    }

    #[test]
    fn missing_base_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .view(|tx| {
                TreeWalker::new(tx).walk(ContainerPath::root("ghost"), &mut Collect::default())
            })
            .unwrap_err();
        assert!(matches!(err, CompactError::NotFound(p) if p == ContainerPath::root("ghost")));
    }

    #[test]
    fn sink_error_aborts_walk() {
        struct FailAfter(usize);
        impl EntrySink for FailAfter {
            fn entry(&mut self, path: &ContainerPath, _value: &[u8]) -> Result<()> {
                if self.0 == 0 {
                    return Err(CompactError::InvalidEntryPath(path.clone()));
                }
                self.0 -= 1;
                Ok(())
            }
        }

        let store = InMemoryStore::new();
        seed(&store, &[("r/a", b"1"), ("r/b", b"2"), ("r/c", b"3")]);

        let mut sink = FailAfter(1);
        let err = store
            .view(|tx| {
                let mut walker = TreeWalker::new(tx);
                let result = walker.walk(ContainerPath::root("r"), &mut sink);
                assert_eq!(walker.stats().entries, 1);
                result
            })
            .unwrap_err();
        assert!(matches!(err, CompactError::InvalidEntryPath(p) if p.last() == b"b"));
    }

    #[test]
    fn deep_hierarchy_is_walked_to_the_bottom() {
        const DEPTH: usize = 500;
        let store = InMemoryStore::new();
        store
            .update(|tx| {
                let mut container = tx.create_root_if_missing(b"d")?;
                for _ in 1..DEPTH {
                    container = container.create_child_if_missing(b"d")?;
                }
                container.put(b"leaf", b"bottom")
            })
            .unwrap();

        let (entries, stats) = walk_all(&store);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, b"bottom".to_vec());
        assert_eq!(stats.max_depth, DEPTH);
        assert_eq!(stats.containers, DEPTH as u64);
    }
}
