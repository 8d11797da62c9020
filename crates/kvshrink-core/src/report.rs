use serde::Serialize;

/// Counters collected while walking a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Containers visited.
    pub containers: u64,
    /// Non-empty entries handed to the sink.
    pub entries: u64,
    /// Zero-length entries that were skipped.
    pub skipped_empty: u64,
    /// Total value bytes handed to the sink.
    pub bytes: u64,
    /// Deepest container path seen, in segments.
    pub max_depth: usize,
}

impl WalkStats {
    /// Fold `other` into `self`.
    pub fn absorb(&mut self, other: &WalkStats) {
        self.containers += other.containers;
        self.entries += other.entries;
        self.skipped_empty += other.skipped_empty;
        self.bytes += other.bytes;
        self.max_depth = self.max_depth.max(other.max_depth);
    }
}

/// Outcome of a compaction pass over two store files.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompactReport {
    pub stats: WalkStats,
    /// Size of the source file after the pass.
    pub source_bytes: u64,
    /// Size of the new, compacted file.
    pub destination_bytes: u64,
}

impl CompactReport {
    /// Bytes saved by the compacted file. Zero if it grew.
    pub fn reclaimed_bytes(&self) -> u64 {
        self.source_bytes.saturating_sub(self.destination_bytes)
    }

    /// Destination size as a fraction of the source size.
    pub fn ratio(&self) -> f64 {
        if self.source_bytes == 0 {
            return 1.0;
        }
        self.destination_bytes as f64 / self.source_bytes as f64
    }
}
