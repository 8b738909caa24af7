//! Which failures switch a download to a single connection instead of failing it.
//!
//! The status set is a heuristic (servers that dislike HEAD or parallel ranges tend to
//! answer 403, 405 or 429), so it is configuration rather than control flow.

use serde::{Deserialize, Serialize};

/// Statuses that trigger single-connection fallback by default.
pub const DEFAULT_FALLBACK_STATUSES: [u32; 3] = [403, 405, 429];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub statuses: Vec<u32>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            statuses: DEFAULT_FALLBACK_STATUSES.to_vec(),
        }
    }
}

impl FallbackPolicy {
    pub fn new(statuses: impl Into<Vec<u32>>) -> Self {
        Self {
            statuses: statuses.into(),
        }
    }

    /// True if an HTTP status means "the server objects to this access pattern".
    pub fn is_eligible_status(&self, code: u32) -> bool {
        self.statuses.contains(&code)
    }
}
