//! Resume-time check of chunk files against recorded progress.
//!
//! The worker appends to chunk files, so a resumed range must start exactly at the
//! file length. A crash between a write and the progress record leaves the two out of
//! step; the file is the source of truth, capped at the chunk length.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use crate::model::{Chunk, DownloadId};

use super::files::chunk_file_path;

/// A correction applied to one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// `bytes_downloaded` now equals the file length.
    Synced { chunk_id: usize, bytes_downloaded: u64 },
    /// The file already holds the whole range.
    Completed { chunk_id: usize },
}

fn file_len(path: &Path) -> io::Result<u64> {
    match std::fs::metadata(path) {
        Ok(m) => Ok(m.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn truncate(path: &Path, len: u64) -> io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_len(len)
}

/// Aligns every pending chunk with its file. Completed chunks are left alone.
pub(crate) fn reconcile(temp_dir: &Path, id: DownloadId, chunks: &mut [Chunk]) -> io::Result<Vec<Adjustment>> {
    let mut out = Vec::new();
    for chunk in chunks.iter_mut().filter(|c| !c.is_completed) {
        let path = chunk_file_path(temp_dir, id, chunk.id);
        let on_disk = file_len(&path)?;

        if chunk.is_unbounded() {
            // No range to resume from: start over.
            if on_disk > 0 {
                truncate(&path, 0)?;
            }
            if chunk.bytes_downloaded != 0 {
                chunk.bytes_downloaded = 0;
                out.push(Adjustment::Synced {
                    chunk_id: chunk.id,
                    bytes_downloaded: 0,
                });
            }
            continue;
        }

        let total = chunk.total_bytes();
        let len = if on_disk > total {
            truncate(&path, total)?;
            total
        } else {
            on_disk
        };
        if len != chunk.bytes_downloaded {
            tracing::debug!(
                download_id = %id,
                chunk = chunk.id,
                recorded = chunk.bytes_downloaded,
                on_disk = len,
                "chunk progress reconciled with file"
            );
            chunk.bytes_downloaded = len;
            out.push(Adjustment::Synced {
                chunk_id: chunk.id,
                bytes_downloaded: len,
            });
        }
        if len == total {
            chunk.mark_completed();
            out.push(Adjustment::Completed { chunk_id: chunk.id });
        }
    }
    Ok(out)
}
