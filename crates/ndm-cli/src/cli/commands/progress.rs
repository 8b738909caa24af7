//! Foreground progress line shared by `get`, `resume` and `retry`.

use anyhow::{anyhow, bail, Result};
use ndm_core::format::{format_bytes, format_eta, format_speed};
use ndm_core::manager::ManagerHandle;
use ndm_core::model::{DownloadId, DownloadRecord, Status};
use std::io::Write;
use std::time::Duration;

const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) fn progress_line(r: &DownloadRecord) -> String {
    let done = r.total_bytes_downloaded();
    let mut line = if r.total_bytes > 0 {
        format!(
            "  {} / {} ({:.1}%)",
            format_bytes(done),
            format_bytes(r.total_bytes),
            r.overall_progress() * 100.0
        )
    } else {
        format!("  {}", format_bytes(done))
    };
    for part in [format_speed(r.speed), format_eta(r.eta)] {
        if !part.is_empty() {
            line.push_str("  ");
            line.push_str(&part);
        }
    }
    line
}

/// Redraws progress until the download settles, then stops the manager.
/// Ctrl-C pauses the download (it can be continued with `ndm resume`).
pub(crate) async fn follow(handle: &ManagerHandle, id: DownloadId) -> Result<()> {
    let mut ticker = tokio::time::interval(REDRAW_INTERVAL);
    let record = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                handle.shutdown().await?;
                println!("Paused {id}; continue with `ndm resume {id}`");
                return Ok(());
            }
        }
        let r = handle
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("download {id} disappeared"))?;
        match r.status {
            Status::Completed | Status::Failed | Status::Paused => break r,
            Status::Merging => print!("\r  merging...{:40}", ""),
            Status::Waiting | Status::Downloading => print!("\r{:<60}", progress_line(&r)),
        }
        let _ = std::io::stdout().flush();
    };
    println!();
    handle.shutdown().await?;

    match record.status {
        Status::Completed => {
            println!(
                "Saved {} ({})",
                record.destination_path.display(),
                format_bytes(record.total_bytes)
            );
            Ok(())
        }
        Status::Failed => bail!(
            "download {} failed: {}",
            id,
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
        _ => {
            println!("Paused {id}");
            Ok(())
        }
    }
}
