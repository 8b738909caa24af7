//! Events a coordinator emits towards the record owner.

use crate::model::{Chunk, DownloadId};

/// Mutation requests for the download record. The coordinator never touches the
/// record itself; the manager applies these in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Install (or replace, after fallback) the chunk list and total size.
    Metadata { total_bytes: u64, chunks: Vec<Chunk> },
    /// `bytes` more bytes of `chunk_id` are on disk.
    Progress { chunk_id: usize, bytes: u64 },
    /// Resume reconciliation set the absolute byte count of a chunk.
    ChunkSynced { chunk_id: usize, bytes_downloaded: u64 },
    ChunkComplete { chunk_id: usize },
    /// Every dispatched chunk finished; ready to merge.
    AllComplete,
    Failed { message: String },
}

/// Channel into the record owner (one per manager, shared by all coordinators).
pub type EventSender = tokio::sync::mpsc::UnboundedSender<(DownloadId, DownloadEvent)>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<(DownloadId, DownloadEvent)>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
