use kvshrink_store::{Container, ContainerPath, Store, StoreError};
use tracing::trace;

use crate::error::{CompactError, Result};
use crate::resolve::resolve;
use crate::walker::EntrySink;

/// Copies entries into a destination store, one write transaction per entry.
///
/// Each entry is committed on its own, so a failure part-way through a pass
/// leaves every entry written before it in place. Writing the same path twice
/// keeps the last value.
pub struct CopyWriter<'d, D> {
    destination: &'d D,
    written: u64,
}

impl<'d, D: Store> CopyWriter<'d, D> {
    pub fn new(destination: &'d D) -> Self {
        Self {
            destination,
            written: 0,
        }
    }

    /// Store `value` at `path`, creating the enclosing containers as needed.
    ///
    /// Zero-length values are ignored. `path` must have at least two segments:
    /// the last one is the entry key, the rest name its container.
    pub fn write_copy(&mut self, path: &ContainerPath, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let (parent, key) = path.split_last();
        let parent = parent.ok_or_else(|| CompactError::InvalidEntryPath(path.clone()))?;

        self.destination
            .update(|tx| {
                let container = resolve(tx, &parent, true)?
                    .ok_or_else(|| StoreError::NotFound(parent.clone()))?;
                container.put(key, value)
            })
            .map_err(|source| CompactError::Write {
                path: path.clone(),
                source,
            })?;

        self.written += 1;
        trace!(entry = %path, len = value.len(), "copied");
        Ok(())
    }

    /// Entries committed so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<D: Store> EntrySink for CopyWriter<'_, D> {
    fn entry(&mut self, path: &ContainerPath, value: &[u8]) -> Result<()> {
        self.write_copy(path, value)
    }
}
