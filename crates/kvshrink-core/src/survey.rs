//! Read-only statistics over a store.

use kvshrink_store::{ContainerPath, Store, Transaction};
use serde::Serialize;
use tracing::info;

use crate::error::{CompactError, Result};
use crate::report::WalkStats;
use crate::walker::{EntrySink, TreeWalker};

/// Statistics for one root container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RootSurvey {
    /// Root name, lossily decoded as UTF-8.
    pub name: String,
    pub stats: WalkStats,
}

/// The single largest entry of a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LargestEntry {
    pub path: String,
    pub bytes: u64,
}

/// What a store holds, as seen by a compaction walk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SurveyReport {
    /// Totals across all roots.
    pub stats: WalkStats,
    pub roots: Vec<RootSurvey>,
    pub largest_entry: Option<LargestEntry>,
}

/// Sink that remembers the largest value it sees.
#[derive(Default)]
struct Largest(Option<LargestEntry>);

impl EntrySink for Largest {
    fn entry(&mut self, path: &ContainerPath, value: &[u8]) -> Result<()> {
        let bytes = value.len() as u64;
        if self.0.as_ref().map_or(true, |l| bytes > l.bytes) {
            self.0 = Some(LargestEntry {
                path: path.to_string(),
                bytes,
            });
        }
        Ok(())
    }
}

/// Walk every root of `store` inside one read transaction.
pub fn survey_store<S: Store>(store: &S) -> Result<SurveyReport> {
    let mut largest = Largest::default();
    let mut report = store.view(|tx| {
        let mut report = SurveyReport::default();
        tx.for_each_root(|name, _| {
            let mut walker = TreeWalker::new(tx);
            walker.walk(ContainerPath::root(name), &mut largest)?;
            let stats = walker.into_stats();
            report.stats.absorb(&stats);
            report.roots.push(RootSurvey {
                name: String::from_utf8_lossy(name).into_owned(),
                stats,
            });
            Ok::<_, CompactError>(())
        })?;
        Ok::<_, CompactError>(report)
    })?;
    report.largest_entry = largest.0;

    info!(
        roots = report.roots.len(),
        containers = report.stats.containers,
        entries = report.stats.entries,
        skipped_empty = report.stats.skipped_empty,
        "survey finished"
    );
    Ok(report)
}
