//! Chunk transfer error type.

use crate::fallback::FallbackPolicy;

/// Error returned by a single chunk transfer. Used by the coordinator to decide
/// between failing the download and falling back to a single connection.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Curl reported an error (connection refused, DNS, reset, ...).
    #[error("{0}")]
    Transport(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP error {0}")]
    Http(u32),
    /// Server answered a ranged request with the whole body (or more bytes than asked for).
    #[error("server ignored the Range header")]
    RangeIgnored,
    /// Transfer ended before the requested range was complete.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Chunk file could not be opened or written (disk full, permission denied).
    #[error("chunk file: {0}")]
    Io(#[from] std::io::Error),
}

impl ChunkError {
    /// True if the failure means the server objects to parallel ranged access.
    pub fn is_fallback_eligible(&self, policy: &FallbackPolicy) -> bool {
        match self {
            ChunkError::Http(code) => policy.is_eligible_status(*code),
            ChunkError::RangeIgnored => true,
            ChunkError::Transport(_) | ChunkError::PartialTransfer { .. } | ChunkError::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility() {
        let p = FallbackPolicy::default();
        assert!(ChunkError::Http(403).is_fallback_eligible(&p));
        assert!(ChunkError::RangeIgnored.is_fallback_eligible(&p));
        assert!(!ChunkError::Http(404).is_fallback_eligible(&p));
        assert!(!ChunkError::PartialTransfer { expected: 10, received: 2 }.is_fallback_eligible(&p));
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(!ChunkError::Io(io).is_fallback_eligible(&p));
    }

    #[test]
    fn messages() {
        assert_eq!(ChunkError::Http(429).to_string(), "HTTP error 429");
        assert_eq!(
            ChunkError::PartialTransfer { expected: 10, received: 4 }.to_string(),
            "partial transfer: expected 10 bytes, got 4"
        );
    }
}
