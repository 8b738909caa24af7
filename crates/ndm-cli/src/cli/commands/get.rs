//! `ndm get <url>` – add one download and follow it in the foreground.

use anyhow::Result;
use ndm_core::config::NdmConfig;
use ndm_core::manager::AddRequest;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{open_manager, progress};

pub async fn run_get(
    cfg: &NdmConfig,
    url: String,
    output: Option<PathBuf>,
    name: Option<String>,
    headers: HashMap<String, String>,
) -> Result<()> {
    let (handle, _task) = open_manager(cfg)?;
    let id = handle
        .add(AddRequest {
            url,
            file_name: name,
            destination: output,
            headers,
        })
        .await?;
    if let Some(r) = handle.get(id).await? {
        println!("Downloading {} -> {}", r.url, r.destination_path.display());
    }
    progress::follow(&handle, id).await
}
