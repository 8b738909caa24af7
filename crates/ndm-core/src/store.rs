//! JSON persistence of the download list.
//!
//! The whole list is one JSON array, rewritten on every save through a temp file and
//! a rename so a crash never leaves a half-written file behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::model::{DownloadRecord, Status};

pub const STORE_FILE_NAME: &str = "downloads.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid download list: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Location(#[from] xdg::BaseDirectoriesError),
}

/// Default location: `$XDG_DATA_HOME/ndm/downloads.json`.
pub fn default_store_path() -> Result<PathBuf, StoreError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ndm")?;
    xdg_dirs
        .place_data_file(STORE_FILE_NAME)
        .map_err(|source| StoreError::Io {
            path: xdg_dirs.get_data_home(),
            source,
        })
}

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the list. A missing file is an empty list. Records left `downloading` or
    /// `merging` by an unclean exit come back `paused`, with chunk progress untouched.
    pub fn load(&self) -> Result<Vec<DownloadRecord>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let mut records: Vec<DownloadRecord> = serde_json::from_slice(&data)?;
        for r in &mut records {
            if r.status.is_active() {
                tracing::debug!(download_id = %r.id, status = %r.status, "interrupted download marked paused");
                r.status = Status::Paused;
            }
            r.clear_rates();
        }
        Ok(records)
    }

    pub fn save(&self, records: &[DownloadRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let json = serde_json::to_vec_pretty(records)?;

        let tmp = tmp_path(&self.path);
        {
            let mut f = fs::File::create(&tmp).map_err(io_err(&tmp))?;
            f.write_all(&json).map_err(io_err(&tmp))?;
            f.sync_all().map_err(io_err(&tmp))?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "download list saved");
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".tmp");
    PathBuf::from(o)
}
