//! `ndm serve` – manager plus browser command server, until Ctrl-C.

use anyhow::{Context, Result};
use ndm_core::command_server::CommandServer;
use ndm_core::config::NdmConfig;
use std::sync::Arc;

use super::open_manager;

pub async fn run_serve(cfg: &NdmConfig) -> Result<()> {
    let (handle, task) = open_manager(cfg)?;
    let server = CommandServer::bind(cfg.command_server_port, Arc::new(handle.clone()))
        .await
        .with_context(|| format!("bind command server on 127.0.0.1:{}", cfg.command_server_port))?;
    println!("Listening on http://{}", server.local_addr()?);
    let server_task = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
    tracing::info!("interrupt received, shutting down");
    server_task.abort();
    handle.shutdown().await?;
    let _ = task.await;
    println!("Active downloads paused and saved.");
    Ok(())
}
