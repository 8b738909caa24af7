//! Data model: chunks, download records, and lifecycle status.

mod chunk;
mod record;
mod status;

pub use chunk::{Chunk, UNBOUNDED_END};
pub use record::{DownloadId, DownloadRecord};
pub use status::Status;
