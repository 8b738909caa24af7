#![allow(dead_code)]

pub mod range_server;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ndm_core::coordinator::CoordinatorConfig;
use ndm_core::manager::{ManagerHandle, ManagerOptions};
use ndm_core::model::{DownloadId, DownloadRecord, Status};
use ndm_core::partition::PartitionPlan;

/// Body whose bytes encode their own offset, so misplaced ranges show up.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Manager options rooted in `dir`, with small chunks so test bodies split.
pub fn options(dir: &Path, min_segment_bytes: u64) -> ManagerOptions {
    ManagerOptions {
        coordinator: Arc::new(CoordinatorConfig {
            partition: PartitionPlan {
                min_segment_bytes,
                max_segments: 8,
            },
            temp_dir: dir.join("chunks"),
            ..CoordinatorConfig::default()
        }),
        merge_buffer_bytes: 16 * 1024,
        download_dir: dir.join("downloads"),
        progress_interval: Duration::from_millis(100),
        interception_enabled: true,
        store: None,
    }
}

/// Polls until the record reaches a settled status (completed, failed, or paused).
pub async fn wait_settled(handle: &ManagerHandle, id: DownloadId) -> DownloadRecord {
    wait_until(handle, id, |r| {
        matches!(r.status, Status::Completed | Status::Failed | Status::Paused)
    })
    .await
}

pub async fn wait_until(
    handle: &ManagerHandle,
    id: DownloadId,
    mut done: impl FnMut(&DownloadRecord) -> bool,
) -> DownloadRecord {
    for _ in 0..600 {
        let r = handle.get(id).await.unwrap().expect("record exists");
        if done(&r) {
            return r;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("download {} did not reach the expected state", id);
}
