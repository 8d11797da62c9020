//! Entry points that work on store files.

use std::fs;
use std::path::Path;

use kvshrink_store::{OpenOptions, RedbStore, StoreError};
use tracing::info;

use crate::compactor::Compactor;
use crate::config::CompactConfig;
use crate::error::{CompactError, Result};
use crate::report::CompactReport;
use crate::survey::{survey_store, SurveyReport};
use crate::verify::{verify_stores, VerifyReport};

fn require_path(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(CompactError::InvalidArgument(format!("missing {what} path")));
    }
    Ok(())
}

fn require_distinct(old: &Path, new: &Path) -> Result<()> {
    require_path(old, "source store")?;
    require_path(new, "destination store")?;
    if old == new {
        return Err(CompactError::InvalidArgument(
            "source and destination paths must differ".into(),
        ));
    }
    Ok(())
}

fn open(path: &Path, options: &OpenOptions) -> Result<RedbStore> {
    RedbStore::open(path, options).map_err(|source| CompactError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path).map_err(StoreError::Io)?.len())
}

/// Compact the store file at `old` into a new file at `new`.
///
/// `new` must not exist yet. The safety gate in `config` is checked before
/// either file is opened. Both files are closed again before this returns,
/// whatever the outcome. On failure a partially written `new` is left behind
/// and has to be removed before trying again.
pub fn compact(
    old: impl AsRef<Path>,
    new: impl AsRef<Path>,
    config: &CompactConfig,
) -> Result<CompactReport> {
    let (old, new) = (old.as_ref(), new.as_ref());
    require_distinct(old, new)?;
    if new.exists() {
        return Err(CompactError::InvalidArgument(format!(
            "destination {} already exists",
            new.display()
        )));
    }
    config.check_gate()?;

    info!(source = %old.display(), destination = %new.display(), "compacting store");
    let stats = {
        let source = open(old, &config.open_options())?;
        let destination = open(new, &config.open_options().create(true))?;
        let compactor = Compactor::new(&source, &destination, config);
        compactor.run()?
    };

    let report = CompactReport {
        stats,
        source_bytes: file_size(old)?,
        destination_bytes: file_size(new)?,
    };
    info!(
        source_bytes = report.source_bytes,
        destination_bytes = report.destination_bytes,
        reclaimed_bytes = report.reclaimed_bytes(),
        "compaction complete"
    );
    Ok(report)
}

/// Check that every non-empty entry of `old` is present and identical in
/// `new`. Neither file is modified.
pub fn verify(
    old: impl AsRef<Path>,
    new: impl AsRef<Path>,
    config: &CompactConfig,
) -> Result<VerifyReport> {
    let (old, new) = (old.as_ref(), new.as_ref());
    require_distinct(old, new)?;
    let source = open(old, &config.open_options())?;
    let copy = open(new, &config.open_options())?;
    verify_stores(&source, &copy)
}

/// Collect statistics about the store file at `path`.
pub fn survey(path: impl AsRef<Path>, config: &CompactConfig) -> Result<SurveyReport> {
    let path = path.as_ref();
    require_path(path, "store")?;
    let store = open(path, &config.open_options())?;
    survey_store(&store)
}
