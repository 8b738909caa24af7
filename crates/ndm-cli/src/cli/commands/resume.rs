//! `ndm resume <id>` and `ndm retry <id>` – continue or restart a saved download.

use anyhow::{bail, Result};
use ndm_core::config::NdmConfig;

use super::{open_manager, progress, resolve_id};

pub async fn run_resume(cfg: &NdmConfig, id: &str) -> Result<()> {
    let (handle, _task) = open_manager(cfg)?;
    let id = resolve_id(&handle.list().await?, id)?;
    if !handle.resume(id).await? {
        handle.shutdown().await?;
        bail!("download {id} is not paused or failed");
    }
    println!("Resuming {id}");
    progress::follow(&handle, id).await
}

pub async fn run_retry(cfg: &NdmConfig, id: &str) -> Result<()> {
    let (handle, _task) = open_manager(cfg)?;
    let id = resolve_id(&handle.list().await?, id)?;
    if !handle.retry(id).await? {
        handle.shutdown().await?;
        bail!("download {id} cannot be retried right now");
    }
    println!("Retrying {id} from scratch");
    progress::follow(&handle, id).await
}
