//! Chunk file naming and cleanup.
//!
//! Chunk files live in one scratch directory shared by all downloads and are
//! named `<download id>_chunk_<index>`.

use std::io;
use std::path::{Path, PathBuf};

use crate::model::{Chunk, DownloadId};

/// Default scratch directory: `$TMPDIR/ndm`.
pub fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("ndm")
}

pub fn chunk_file_path(temp_dir: &Path, id: DownloadId, chunk_id: usize) -> PathBuf {
    temp_dir.join(format!("{}_chunk_{}", id, chunk_id))
}

/// Chunk file paths in ordinal order (the order the merger concatenates them in).
pub fn ordered_chunk_paths(temp_dir: &Path, id: DownloadId, chunks: &[Chunk]) -> Vec<PathBuf> {
    let mut ids: Vec<usize> = chunks.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids.into_iter()
        .map(|chunk_id| chunk_file_path(temp_dir, id, chunk_id))
        .collect()
}

/// Deletes every chunk file belonging to `id`. Returns how many were removed.
/// A missing scratch directory is not an error.
pub fn remove_chunk_files(temp_dir: &Path, id: DownloadId) -> io::Result<usize> {
    let prefix = format!("{}_chunk_", id);
    let entries = match std::fs::read_dir(temp_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_ordered_by_chunk_id() {
        let id = uuid::Uuid::new_v4();
        let dir = Path::new("/scratch");
        let chunks = vec![Chunk::new(2, 20, 29), Chunk::new(0, 0, 9), Chunk::new(1, 10, 19)];
        let paths = ordered_chunk_paths(dir, id, &chunks);
        assert_eq!(paths[0], dir.join(format!("{}_chunk_0", id)));
        assert_eq!(paths[2], dir.join(format!("{}_chunk_2", id)));
    }

    #[test]
    fn removes_only_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let mine = uuid::Uuid::new_v4();
        let other = uuid::Uuid::new_v4();
        for i in 0..3 {
            std::fs::write(chunk_file_path(dir.path(), mine, i), b"x").unwrap();
        }
        std::fs::write(chunk_file_path(dir.path(), other, 0), b"y").unwrap();

        assert_eq!(remove_chunk_files(dir.path(), mine).unwrap(), 3);
        assert!(!chunk_file_path(dir.path(), mine, 0).exists());
        assert!(chunk_file_path(dir.path(), other, 0).exists());
    }

    #[test]
    fn missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert_eq!(remove_chunk_files(&gone, uuid::Uuid::new_v4()).unwrap(), 0);
    }
}
