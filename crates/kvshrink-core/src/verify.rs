//! Entry-by-entry comparison of a compacted store against its source.

use kvshrink_store::{Container, ContainerPath, Store, StoreError, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CompactError, Result};
use crate::resolve::resolve;
use crate::walker::{EntrySink, TreeWalker};

/// How many offending paths a [`VerifyReport`] lists per category.
pub const MAX_REPORTED_PATHS: usize = 32;

/// Differences found between a source store and its compacted copy.
///
/// Zero-length source entries are never copied, so they are not expected in
/// the copy either.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Non-empty source entries looked up in the copy.
    pub checked: u64,
    /// Source entries absent from the copy.
    pub missing: u64,
    /// Source entries whose value differs in the copy.
    pub mismatched: u64,
    /// Entries of the copy that the source does not have.
    pub unexpected: u64,
    /// First few missing paths.
    pub missing_paths: Vec<String>,
    /// First few mismatched paths.
    pub mismatched_paths: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing == 0 && self.mismatched == 0 && self.unexpected == 0
    }

    fn note(paths: &mut Vec<String>, path: &ContainerPath) {
        if paths.len() < MAX_REPORTED_PATHS {
            paths.push(path.to_string());
        }
    }
}

/// Sink that looks every entry up in another transaction.
pub struct Verifier<'t, T> {
    copy: &'t T,
    report: VerifyReport,
}

impl<'t, T: Transaction> Verifier<'t, T> {
    pub fn new(copy: &'t T) -> Self {
        Self {
            copy,
            report: VerifyReport::default(),
        }
    }

    pub fn into_report(self) -> VerifyReport {
        self.report
    }

    fn lookup(&self, path: &ContainerPath) -> Result<Option<Vec<u8>>> {
        let (parent, key) = path.split_last();
        let parent = parent.ok_or_else(|| CompactError::InvalidEntryPath(path.clone()))?;
        let read = |source: StoreError| CompactError::Read {
            path: path.clone(),
            source,
        };
        match resolve(self.copy, &parent, false).map_err(read)? {
            Some(container) => container.get(key).map_err(read),
            None => Ok(None),
        }
    }
}

impl<T: Transaction> EntrySink for Verifier<'_, T> {
    fn entry(&mut self, path: &ContainerPath, value: &[u8]) -> Result<()> {
        self.report.checked += 1;
        match self.lookup(path)? {
            Some(copied) if copied == value => {}
            Some(_) => {
                debug!(entry = %path, "value differs");
                self.report.mismatched += 1;
                VerifyReport::note(&mut self.report.mismatched_paths, path);
            }
            None => {
                debug!(entry = %path, "missing from copy");
                self.report.missing += 1;
                VerifyReport::note(&mut self.report.missing_paths, path);
            }
        }
        Ok(())
    }
}

/// Counts entries without looking at them.
struct Discard;

impl EntrySink for Discard {
    fn entry(&mut self, _path: &ContainerPath, _value: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Compare every entry of `source` against `copy`.
///
/// Both stores are read through one read transaction each, held for the whole
/// comparison.
pub fn verify_stores<S: Store, C: Store>(source: &S, copy: &C) -> Result<VerifyReport> {
    let report = source.view(|src| {
        copy.view(|dst| {
            let mut verifier = Verifier::new(dst);
            let mut walker = TreeWalker::new(src);
            src.for_each_root(|name, _| walker.walk(ContainerPath::root(name), &mut verifier))?;

            // Every copied entry is either accounted for above or unexpected.
            let mut copy_walker = TreeWalker::new(dst);
            dst.for_each_root(|name, _| copy_walker.walk(ContainerPath::root(name), &mut Discard))?;
            let copy_stats = copy_walker.into_stats();

            let mut report = verifier.into_report();
            let found = report.checked - report.missing;
            report.unexpected =
                (copy_stats.entries + copy_stats.skipped_empty).saturating_sub(found);
            Ok::<_, CompactError>(report)
        })
    })?;

    info!(
        checked = report.checked,
        missing = report.missing,
        mismatched = report.mismatched,
        unexpected = report.unexpected,
        "verification finished"
    );
    Ok(report)
}
