use kvshrink_store::{ContainerPath, Store, Transaction};
use tracing::info;

use crate::config::CompactConfig;
use crate::error::{CompactError, Result};
use crate::report::WalkStats;
use crate::walker::TreeWalker;
use crate::writer::CopyWriter;

/// One compaction pass from a source store into a destination store.
///
/// The whole source is read through a single read transaction; every entry
/// reaches the destination in its own write transaction. The destination is
/// expected to be empty, but nothing enforces it.
pub struct Compactor<'a, S, D> {
    source: &'a S,
    destination: &'a D,
    config: &'a CompactConfig,
}

impl<'a, S: Store, D: Store> Compactor<'a, S, D> {
    pub fn new(source: &'a S, destination: &'a D, config: &'a CompactConfig) -> Self {
        Self {
            source,
            destination,
            config,
        }
    }

    /// Copy every non-empty entry of every root container.
    ///
    /// Fails with [`CompactError::SafetyGate`] before touching either store
    /// unless the configuration enables it. Stops at the first error; entries
    /// already copied stay in the destination.
    pub fn run(&self) -> Result<WalkStats> {
        self.config.check_gate()?;
        info!("compaction pass starting");

        let mut writer = CopyWriter::new(self.destination);
        let stats = self.source.view(|tx| {
            let mut walker = TreeWalker::new(tx);
            tx.for_each_root(|name, _| walker.walk(ContainerPath::root(name), &mut writer))?;
            Ok::<_, CompactError>(walker.into_stats())
        })?;

        info!(
            containers = stats.containers,
            entries = stats.entries,
            skipped_empty = stats.skipped_empty,
            bytes = stats.bytes,
            "compaction pass finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dump, seed};
    use kvshrink_store::{InMemoryStore, StoreError};
    use proptest::prelude::*;

    fn run(src: &InMemoryStore, dst: &InMemoryStore) -> Result<WalkStats> {
        Compactor::new(src, dst, &CompactConfig::enabled()).run()
    }

    #[test]
    fn copies_nested_structure() {
        let src = InMemoryStore::new();
        seed(
            &src,
            &[
                ("names/first/american/john", &[0]),
                ("names/first/american/joe", &[1]),
                ("names/first/american/bob", &[2]),
                ("names/last/smith", b"s"),
                ("config/version", b"3"),
            ],
        );
        let dst = InMemoryStore::new();

        let stats = run(&src, &dst).unwrap();
        assert_eq!(dump(&dst), dump(&src));
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.containers, 5);
    }

    #[test]
    fn zero_length_entries_are_not_copied() {
        let src = InMemoryStore::new();
        seed(&src, &[("a/empty", b""), ("a/full", b"x"), ("b/c/empty", b"")]);
        let dst = InMemoryStore::new();

        let stats = run(&src, &dst).unwrap();
        assert_eq!(dump(&dst), vec![("a/full".to_string(), b"x".to_vec())]);
        assert_eq!(stats.skipped_empty, 2);
        // Root `b` held nothing but an empty entry, so it never materialises.
        assert_eq!(dst.root_count(), 1);
    }

    #[test]
    fn destination_iterates_in_key_order() {
        let src = InMemoryStore::new();
        seed(&src, &[("r/zeta", b"1"), ("r/alpha", b"2"), ("r/mid", b"3")]);
        let dst = InMemoryStore::new();
        run(&src, &dst).unwrap();

        let keys: Vec<String> = dump(&dst).into_iter().map(|(p, _)| p).collect();
        assert_eq!(keys, vec!["r/alpha", "r/mid", "r/zeta"]);
    }

    #[test]
    fn gate_disabled_writes_nothing() {
        let src = InMemoryStore::new();
        seed(&src, &[("a/b", b"1")]);
        let dst = InMemoryStore::new();

        let err = Compactor::new(&src, &dst, &CompactConfig::default())
            .run()
            .unwrap_err();
        assert!(matches!(err, CompactError::SafetyGate));
        assert!(dst.is_empty());
    }

    #[test]
    fn empty_source_is_fine() {
        let src = InMemoryStore::new();
        let dst = InMemoryStore::new();
        assert_eq!(run(&src, &dst).unwrap(), WalkStats::default());
        assert!(dst.is_empty());
    }

    #[test]
    fn write_failure_keeps_earlier_entries_and_stops() {
        let src = InMemoryStore::new();
        seed(
            &src,
            &[
                ("a/x", b"1"),
                ("a/y", b"2"),
                ("b/c/k", b"3"),
                ("d/z", b"4"),
            ],
        );
        let dst = InMemoryStore::new();
        // `b/c` is a plain value in the destination, so `b/c/k` cannot land.
        seed(&dst, &[("b/c", b"in the way")]);

        let err = run(&src, &dst).unwrap_err();
        match err {
            CompactError::Write { path, source } => {
                assert_eq!(path, ContainerPath::parse("b/c/k").unwrap());
                assert!(matches!(source, StoreError::IncompatibleValue(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            dump(&dst),
            vec![
                ("a/x".to_string(), b"1".to_vec()),
                ("a/y".to_string(), b"2".to_vec()),
                ("b/c".to_string(), b"in the way".to_vec()),
            ]
        );
    }

    #[test]
    fn nested_entry_fails_before_later_sibling_is_written() {
        let src = InMemoryStore::new();
        seed(&src, &[("r/a/k", b"1"), ("r/m", b"2")]);
        let dst = InMemoryStore::new();
        // `r/a` sorts before `r/m`, so the blocked `r/a/k` is the first write.
        seed(&dst, &[("r/a", b"blocker")]);

        let err = run(&src, &dst).unwrap_err();
        match err {
            CompactError::Write { path, source } => {
                assert_eq!(path, ContainerPath::parse("r/a/k").unwrap());
                assert!(matches!(source, StoreError::IncompatibleValue(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dump(&dst), vec![("r/a".to_string(), b"blocker".to_vec())]);
    }

    // ------------------------------------------------------------------
    // Random trees
    // ------------------------------------------------------------------

    /// Entry paths whose container segments (`c*`) never collide with entry
    /// keys (`k*`).
    fn tree() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
        let entry = (
            proptest::collection::vec(0u8..3, 1..5),
            0u8..4,
            proptest::collection::vec(any::<u8>(), 0..6),
        )
            .prop_map(|(containers, key, value)| {
                let mut segments: Vec<String> =
                    containers.iter().map(|c| format!("c{c}")).collect();
                segments.push(format!("k{key}"));
                (segments.join("/"), value)
            });
        proptest::collection::vec(entry, 0..40)
    }

    proptest! {
        #[test]
        fn compaction_preserves_every_non_empty_entry(entries in tree()) {
            let src = InMemoryStore::new();
            let refs: Vec<(&str, &[u8])> = entries
                .iter()
                .map(|(p, v)| (p.as_str(), v.as_slice()))
                .collect();
            seed(&src, &refs);
            let dst = InMemoryStore::new();

            let stats = run(&src, &dst).unwrap();

            let expected: Vec<(String, Vec<u8>)> = dump(&src)
                .into_iter()
                .filter(|(_, v)| !v.is_empty())
                .collect();
            let copied = dump(&dst);
            prop_assert!(copied.iter().all(|(_, v)| !v.is_empty()));
            prop_assert_eq!(stats.entries as usize, expected.len());
            prop_assert_eq!(copied, expected);
        }
    }
}
