//! `ndm remove <id>` – cancel a download, delete its chunk files and forget it.

use anyhow::Result;
use ndm_core::config::NdmConfig;

use super::{open_manager, resolve_id};

pub async fn run_remove(cfg: &NdmConfig, id: &str) -> Result<()> {
    let (handle, _task) = open_manager(cfg)?;
    let id = resolve_id(&handle.list().await?, id)?;
    let removed = handle.delete(id).await?;
    handle.shutdown().await?;
    if removed {
        println!("Removed {id}");
    }
    Ok(())
}
