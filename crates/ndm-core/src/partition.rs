//! Chunk planning.
//!
//! Splits a resource of known size into at most `max_segments` equal-width chunks,
//! never narrower than `min_segment_bytes` (except when the whole file is smaller).
//! The last chunk absorbs the remainder.

use crate::model::Chunk;

/// Default lower bound on chunk width.
pub const DEFAULT_MIN_SEGMENT_BYTES: u64 = 256 * 1024;
/// Default upper bound on connections per download.
pub const DEFAULT_MAX_SEGMENTS: usize = 8;

/// Partitioning limits (taken from config).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub min_segment_bytes: u64,
    pub max_segments: usize,
}

impl Default for PartitionPlan {
    fn default() -> Self {
        Self {
            min_segment_bytes: DEFAULT_MIN_SEGMENT_BYTES,
            max_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}

impl PartitionPlan {
    /// Number of chunks for `total_size`: `clamp(total / min, 1, max)`.
    pub fn segment_count(&self, total_size: u64) -> usize {
        let max = self.max_segments.max(1) as u64;
        let by_size = total_size / self.min_segment_bytes.max(1);
        by_size.clamp(1, max) as usize
    }

    /// Chunk list for a probed resource.
    ///
    /// Returns a single unbounded chunk when ranged fetch is unsupported or the size is unknown.
    pub fn chunks_for(&self, total_size: u64, supports_ranges: bool) -> Vec<Chunk> {
        if !supports_ranges || total_size == 0 {
            return vec![Chunk::unbounded()];
        }
        let count = self.segment_count(total_size);
        let width = total_size / count as u64;
        (0..count)
            .map(|i| {
                let start = i as u64 * width;
                let end = if i == count - 1 {
                    total_size - 1
                } else {
                    start + width - 1
                };
                Chunk::new(i, start, end)
            })
            .collect()
    }
}
