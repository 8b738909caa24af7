//! Chunk type: one byte range of the target resource plus progress counters.

use serde::{Deserialize, Serialize};

/// End offset marking a whole-resource (non-range) chunk.
///
/// Stored as `i64::MAX` so the persisted JSON stays readable by signed 64-bit consumers.
pub const UNBOUNDED_END: u64 = i64::MAX as u64;

/// A contiguous byte range [start_byte, end_byte] (inclusive) and how much of it is on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Ordinal index, unique within a download and stable across resumes.
    pub id: usize,
    pub start_byte: u64,
    /// Inclusive end offset, or [`UNBOUNDED_END`].
    pub end_byte: u64,
    #[serde(default)]
    pub bytes_downloaded: u64,
    #[serde(default)]
    pub is_completed: bool,
}

impl Chunk {
    pub fn new(id: usize, start_byte: u64, end_byte: u64) -> Self {
        Self {
            id,
            start_byte,
            end_byte,
            bytes_downloaded: 0,
            is_completed: false,
        }
    }

    /// Single chunk covering the whole resource, fetched without a `Range` header.
    pub fn unbounded() -> Self {
        Self::new(0, 0, UNBOUNDED_END)
    }

    pub fn is_unbounded(&self) -> bool {
        self.end_byte == UNBOUNDED_END
    }

    /// Length of the range in bytes (`end - start + 1`).
    pub fn total_bytes(&self) -> u64 {
        self.end_byte.saturating_sub(self.start_byte).saturating_add(1)
    }

    /// Bytes still missing. `None` for unbounded chunks (size not known up front).
    pub fn remaining(&self) -> Option<u64> {
        if self.is_unbounded() {
            return None;
        }
        Some(self.total_bytes().saturating_sub(self.bytes_downloaded))
    }

    /// Offset the next request starts from.
    pub fn resume_offset(&self) -> u64 {
        self.start_byte + self.bytes_downloaded
    }

    /// Missing part as `start-end` (inclusive), the form libcurl's range option takes.
    /// `None` for unbounded chunks, which are fetched without a `Range` header.
    pub fn missing_range(&self) -> Option<String> {
        if self.is_unbounded() {
            return None;
        }
        Some(format!("{}-{}", self.resume_offset(), self.end_byte))
    }

    /// Add received bytes, clamped so `bytes_downloaded` never exceeds the range length.
    pub fn record_progress(&mut self, bytes: u64) {
        let next = self.bytes_downloaded.saturating_add(bytes);
        self.bytes_downloaded = if self.is_unbounded() {
            next
        } else {
            next.min(self.total_bytes())
        };
    }

    /// Mark complete. Bounded chunks snap `bytes_downloaded` to the full length.
    pub fn mark_completed(&mut self) {
        self.is_completed = true;
        if !self.is_unbounded() {
            self.bytes_downloaded = self.total_bytes();
        }
    }
}
