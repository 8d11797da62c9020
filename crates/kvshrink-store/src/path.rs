use std::fmt;

use crate::error::{StoreError, StoreResult};
use crate::names::validate_name;

/// A single container or entry name.
pub type Name = Vec<u8>;

/// Location of a container or entry, as the ordered names leading to it from
/// the store root.
///
/// A path always has at least one segment: the store root itself is not
/// addressable. Paths are immutable once built. [`ContainerPath::child`]
/// returns a new path with its own segment storage, so extending a path for
/// one branch of a walk can never disturb the path held by a sibling branch.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerPath {
    segments: Vec<Name>,
}

impl ContainerPath {
    /// Path to the root container `name`.
    pub fn root(name: impl Into<Name>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Build a path from its segments.
    ///
    /// Fails when there are no segments or when any segment is not a valid
    /// name.
    pub fn from_segments<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        let segments: Vec<Name> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(StoreError::InvalidName("path needs at least one segment".into()));
        }
        for segment in &segments {
            validate_name(segment)?;
        }
        Ok(Self { segments })
    }

    /// Parse a `/`-separated path such as `names/first/american`.
    pub fn parse(s: &str) -> StoreResult<Self> {
        Self::from_segments(s.split('/').map(|seg| seg.as_bytes().to_vec()))
    }

    /// Path to the child `name` of this path.
    pub fn child(&self, name: impl AsRef<[u8]>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(name.as_ref().to_vec());
        Self { segments }
    }

    /// The enclosing path, or `None` for a root container.
    pub fn parent(&self) -> Option<Self> {
        match self.segments.len() {
            1 => None,
            n => Some(Self {
                segments: self.segments[..n - 1].to_vec(),
            }),
        }
    }

    /// Split into the enclosing path and the final segment.
    pub fn split_last(&self) -> (Option<Self>, &[u8]) {
        (self.parent(), self.last())
    }

    /// All segments, root first.
    pub fn segments(&self) -> &[Name] {
        &self.segments
    }

    /// Number of segments (always at least one).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final segment.
    pub fn last(&self) -> &[u8] {
        &self.segments[self.segments.len() - 1]
    }

    /// Whether `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &ContainerPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "[{}]", String::from_utf8_lossy(segment))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
