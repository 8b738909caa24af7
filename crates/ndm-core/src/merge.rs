//! Concatenates finished chunk files into the destination file.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Copy buffer size used when the caller does not configure one.
pub const DEFAULT_MERGE_BUFFER_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("cannot create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
    #[error("cannot read chunk {}: {source}", path.display())]
    Chunk { path: PathBuf, source: io::Error },
    #[error("write to {} failed: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy)]
pub struct FileMerger {
    buffer_bytes: usize,
}

impl Default for FileMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_BUFFER_BYTES)
    }
}

impl FileMerger {
    pub fn new(buffer_bytes: usize) -> Self {
        Self {
            buffer_bytes: buffer_bytes.max(4096),
        }
    }

    /// Writes `chunks` (already in order) back to back into `destination`, syncs it,
    /// then deletes the chunk files. On any error the chunk files are left untouched
    /// and the destination holds an incomplete file.
    pub fn merge(&self, chunks: &[PathBuf], destination: &Path) -> Result<u64, MergeError> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| MergeError::Create {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut out = File::create(destination).map_err(|source| MergeError::Create {
            path: destination.to_path_buf(),
            source,
        })?;
        let write_err = |source| MergeError::Write {
            path: destination.to_path_buf(),
            source,
        };

        let mut buf = vec![0u8; self.buffer_bytes];
        let mut written = 0u64;
        for path in chunks {
            let chunk_err = |source| MergeError::Chunk {
                path: path.clone(),
                source,
            };
            let mut input = File::open(path).map_err(chunk_err)?;
            loop {
                let n = match input.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(chunk_err(e)),
                };
                out.write_all(&buf[..n]).map_err(write_err)?;
                written += n as u64;
            }
        }
        out.flush().map_err(write_err)?;
        out.sync_all().map_err(write_err)?;

        for path in chunks {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("could not remove chunk file {}: {}", path.display(), e);
            }
        }
        tracing::debug!(
            destination = %destination.display(),
            chunks = chunks.len(),
            bytes = written,
            "merge finished"
        );
        Ok(written)
    }
}
