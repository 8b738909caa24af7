//! CLI command handlers, one file per command.

mod get;
mod list;
mod progress;
mod remove;
mod resume;
mod serve;

pub use get::run_get;
pub use list::run_list;
pub use remove::run_remove;
pub use resume::{run_resume, run_retry};
pub use serve::run_serve;

use anyhow::{bail, Result};
use ndm_core::config::NdmConfig;
use ndm_core::manager::{self, ManagerHandle, ManagerOptions};
use ndm_core::model::{DownloadId, DownloadRecord};
use ndm_core::store::{self, Store};
use tokio::task::JoinHandle;

/// Spawns a manager over the persisted download list.
pub(crate) fn open_manager(cfg: &NdmConfig) -> Result<(ManagerHandle, JoinHandle<()>)> {
    let store = Store::new(store::default_store_path()?);
    Ok(manager::spawn(ManagerOptions::from_config(cfg, Some(store)))?)
}

/// Finds the record whose id starts with `prefix` (case-insensitive).
pub(crate) fn resolve_id(records: &[DownloadRecord], prefix: &str) -> Result<DownloadId> {
    let needle = prefix.trim().to_ascii_lowercase();
    if needle.is_empty() {
        bail!("empty download id");
    }
    let mut hits = records
        .iter()
        .filter(|r| r.id.to_string().starts_with(&needle))
        .map(|r| r.id);
    match (hits.next(), hits.next()) {
        (Some(id), None) => Ok(id),
        (None, _) => bail!("no download matches {:?}", prefix),
        (Some(_), Some(_)) => bail!("{:?} matches more than one download", prefix),
    }
}
