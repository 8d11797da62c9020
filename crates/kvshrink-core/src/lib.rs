//! Compaction of hierarchical key-value store files.
//!
//! A store file accumulates dead space as data is deleted or overwritten.
//! Compaction reclaims it by copying every live entry into a freshly created
//! file:
//!
//! 1. One read transaction on the source spans the whole pass.
//! 2. A [`TreeWalker`] visits every container depth-first and hands each
//!    non-empty entry, with its full path, to an [`EntrySink`].
//! 3. The [`CopyWriter`] sink commits each entry to the destination in its own
//!    write transaction, creating the enclosing containers on the way.
//!
//! Zero-length values mean "no payload" and are never copied. Copying is
//! entry-granular: a pass that fails part-way leaves everything it copied so
//! far in the destination.
//!
//! # Entry points
//!
//! - [`compact`] -- compact one store file into a new one
//! - [`verify`] -- compare a compacted file against its source
//! - [`survey`] -- collect statistics about a store file
//! - [`Compactor`] -- a pass between any two [`kvshrink_store::Store`]s
//!
//! Compaction is irreversible and experimental; it only runs when
//! [`CompactConfig::danger_zone`] is [`DangerZone::Enabled`].

pub mod compactor;
pub mod config;
pub mod error;
pub mod ops;
pub mod report;
pub mod resolve;
pub mod survey;
pub mod verify;
pub mod walker;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use compactor::Compactor;
pub use config::{CompactConfig, DangerZone};
pub use error::{CompactError, Result};
pub use ops::{compact, survey, verify};
pub use report::{CompactReport, WalkStats};
pub use resolve::resolve;
pub use survey::{survey_store, LargestEntry, RootSurvey, SurveyReport};
pub use verify::{verify_stores, Verifier, VerifyReport, MAX_REPORTED_PATHS};
pub use walker::{EntrySink, TreeWalker};
pub use writer::CopyWriter;
