//! The manager task: the single writer of download records.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{naming, AddRequest, Command, ManagerOptions};
use crate::coordinator::{event_channel, ordered_chunk_paths, remove_chunk_files, Coordinator, DownloadEvent, EventReceiver, EventSender};
use crate::merge::FileMerger;
use crate::model::{DownloadId, DownloadRecord, Status};

/// Work finished off the actor task and reported back to it.
enum Internal {
    /// A start deferred until the previous coordinator's threads exited.
    Start(DownloadId),
    MergeFinished {
        id: DownloadId,
        result: Result<u64, String>,
    },
}

#[derive(Debug, Clone, Copy)]
enum StopMode {
    Pause,
    Cancel,
    /// The download already failed; only wait for its canceled workers.
    Reap,
}

pub(super) struct Actor {
    options: ManagerOptions,
    records: Vec<DownloadRecord>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: EventSender,
    events: EventReceiver,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal: mpsc::UnboundedReceiver<Internal>,
    coordinators: HashMap<DownloadId, Coordinator>,
    /// Pause/cancel in progress: worker threads still being joined.
    stopping: HashMap<DownloadId, JoinHandle<()>>,
    /// Merges still copying chunk files into their destination.
    merges: HashMap<DownloadId, JoinHandle<()>>,
    /// Progress for chunk ids not in the record yet, applied when the chunk list arrives.
    pending_progress: HashMap<DownloadId, HashMap<usize, u64>>,
    /// Downloaded-byte totals at the previous rate sample.
    last_sample: HashMap<DownloadId, u64>,
}

impl Actor {
    pub(super) fn new(
        options: ManagerOptions,
        records: Vec<DownloadRecord>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (events_tx, events) = event_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let last_sample = records
            .iter()
            .map(|r| (r.id, r.total_bytes_downloaded()))
            .collect();
        Self {
            options,
            records,
            commands,
            events_tx,
            events,
            internal_tx,
            internal,
            coordinators: HashMap::new(),
            stopping: HashMap::new(),
            merges: HashMap::new(),
            pending_progress: HashMap::new(),
            last_sample,
        }
    }

    pub(super) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.options.progress_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        self.shutdown().await;
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
                Some((id, event)) = self.events.recv() => self.apply_event(id, event),
                Some(msg) = self.internal.recv() => self.handle_internal(msg),
                _ = ticker.tick() => self.sample_rates(),
            }
        }
        tracing::debug!("download manager stopped");
    }

    /// Returns false once the actor should stop.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Add { request, reply } => {
                let id = self.add(request);
                if let Some(reply) = reply {
                    let _ = reply.send(id);
                }
            }
            Command::Start(id, reply) => {
                let startable = self.record(id).is_some_and(|r| r.status.can_resume());
                if startable {
                    self.request_start(id);
                }
                let _ = reply.send(startable);
            }
            Command::Pause(id, reply) => self.pause(id, Some(reply)),
            Command::Resume(id, reply) => {
                let _ = reply.send(self.resume(id));
            }
            Command::Cancel(id, reply) => self.cancel(id, reply),
            Command::Delete(id, reply) => self.delete(id, reply),
            Command::Retry(id, reply) => {
                let _ = reply.send(self.retry(id));
            }
            Command::PauseAll(reply) => {
                let ids: Vec<DownloadId> = self
                    .records
                    .iter()
                    .filter(|r| r.status == Status::Downloading)
                    .map(|r| r.id)
                    .collect();
                for id in ids {
                    self.pause(id, None);
                }
                let _ = reply.send(());
            }
            Command::ResumeAll(reply) => {
                let ids: Vec<DownloadId> = self
                    .records
                    .iter()
                    .filter(|r| r.status.can_resume())
                    .map(|r| r.id)
                    .collect();
                for id in ids {
                    self.resume(id);
                }
                let _ = reply.send(());
            }
            Command::List(reply) => {
                let _ = reply.send(self.records.clone());
            }
            Command::Get(id, reply) => {
                let _ = reply.send(self.record(id).cloned());
            }
            Command::Shutdown(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Start(id) => {
                // Still queued? A cancel or delete in the meantime wins.
                if self.record(id).map(|r| r.status) == Some(Status::Waiting) {
                    self.start_download(id);
                }
            }
            Internal::MergeFinished { id, result } => self.finish_merge(id, result),
        }
    }

    fn index_of(&self, id: DownloadId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    fn record(&self, id: DownloadId) -> Option<&DownloadRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn record_mut(&mut self, id: DownloadId) -> Option<&mut DownloadRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    fn save(&self) {
        if let Some(store) = &self.options.store {
            if let Err(e) = store.save(&self.records) {
                tracing::warn!("could not save download list: {}", e);
            }
        }
    }

    fn add(&mut self, request: AddRequest) -> DownloadId {
        let file_name = naming::file_name_for(&request.url, request.file_name.as_deref());
        let destination = request
            .destination
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| self.options.download_dir.join(&file_name));
        let mut record = DownloadRecord::new(request.url, file_name, destination);
        record.headers = request.headers;
        let id = record.id;
        tracing::info!(
            download_id = %id,
            url = %record.url,
            destination = %record.destination_path.display(),
            "download added"
        );
        self.records.push(record);
        self.save();
        self.start_download(id);
        id
    }

    /// Starts now, or once a pending pause/cancel of the same record has finished.
    fn request_start(&mut self, id: DownloadId) {
        if self.coordinators.contains_key(&id) {
            return;
        }
        match self.stopping.remove(&id) {
            Some(stop) if !stop.is_finished() => {
                if let Some(r) = self.record_mut(id) {
                    r.status = Status::Waiting;
                    r.error_message = None;
                }
                self.save();
                let tx = self.internal_tx.clone();
                // Stays in `stopping` so a later stop or start waits behind it.
                let deferred = tokio::spawn(async move {
                    let _ = stop.await;
                    let _ = tx.send(Internal::Start(id));
                });
                self.stopping.insert(id, deferred);
            }
            _ => self.start_download(id),
        }
    }

    fn start_download(&mut self, id: DownloadId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        let record = &mut self.records[idx];
        if url::Url::parse(&record.url).is_err() {
            tracing::warn!(download_id = %id, url = %record.url, "invalid URL");
            record.status = Status::Failed;
            record.error_message = Some("Invalid URL".to_string());
            self.save();
            return;
        }
        record.status = Status::Downloading;
        record.error_message = None;
        let resume = if record.chunks.is_empty() {
            None
        } else {
            Some(record.chunks.clone())
        };
        let url = record.url.clone();
        let headers = record.headers.clone();
        self.last_sample.insert(id, record.total_bytes_downloaded());
        self.pending_progress.remove(&id);
        self.save();

        let coordinator = Coordinator::new(id, Arc::clone(&self.options.coordinator), self.events_tx.clone());
        coordinator.start(&url, &headers, resume);
        self.coordinators.insert(id, coordinator);
    }

    /// Stops the record's coordinator (if any) off the actor task. `reply` fires once
    /// the worker threads are gone.
    fn stop(&mut self, id: DownloadId, mode: StopMode, reply: Option<oneshot::Sender<bool>>) {
        let coordinator = self.coordinators.remove(&id);
        let previous = self.stopping.remove(&id);
        let temp_dir = self.options.coordinator.temp_dir.clone();
        let task = tokio::spawn(async move {
            if let Some(prev) = previous {
                let _ = prev.await;
            }
            let joined = tokio::task::spawn_blocking(move || match (coordinator, mode) {
                (Some(c), StopMode::Pause) => c.pause(),
                (Some(c), StopMode::Cancel) => c.cancel(),
                (Some(c), StopMode::Reap) => {
                    c.join_workers();
                }
                (None, StopMode::Pause | StopMode::Reap) => {}
                (None, StopMode::Cancel) => {
                    if let Err(e) = remove_chunk_files(&temp_dir, id) {
                        tracing::warn!(download_id = %id, "could not remove chunk files: {}", e);
                    }
                }
            })
            .await;
            if let Err(e) = joined {
                tracing::warn!(download_id = %id, "stopping download failed: {}", e);
            }
            if let Some(reply) = reply {
                let _ = reply.send(true);
            }
        });
        self.stopping.insert(id, task);
    }

    fn pause(&mut self, id: DownloadId, reply: Option<oneshot::Sender<bool>>) {
        let Some(record) = self.record_mut(id).filter(|r| r.status.can_pause()) else {
            if let Some(reply) = reply {
                let _ = reply.send(false);
            }
            return;
        };
        record.status = Status::Paused;
        record.clear_rates();
        tracing::info!(download_id = %id, "download paused");
        self.save();
        self.stop(id, StopMode::Pause, reply);
    }

    fn resume(&mut self, id: DownloadId) -> bool {
        if !self.record(id).is_some_and(|r| r.status.can_resume()) {
            return false;
        }
        tracing::info!(download_id = %id, "download resumed");
        self.request_start(id);
        true
    }

    fn cancel(&mut self, id: DownloadId, reply: oneshot::Sender<bool>) {
        let Some(record) = self.record_mut(id).filter(|r| r.status.can_cancel()) else {
            let _ = reply.send(false);
            return;
        };
        record.status = Status::Failed;
        record.error_message = Some("Cancelled".to_string());
        record.chunks.clear();
        record.clear_rates();
        tracing::info!(download_id = %id, "download cancelled");
        self.pending_progress.remove(&id);
        self.save();
        self.stop(id, StopMode::Cancel, Some(reply));
    }

    fn delete(&mut self, id: DownloadId, reply: oneshot::Sender<bool>) {
        let Some(idx) = self.index_of(id) else {
            let _ = reply.send(false);
            return;
        };
        self.records.remove(idx);
        self.last_sample.remove(&id);
        self.pending_progress.remove(&id);
        tracing::info!(download_id = %id, "download removed");
        self.save();
        self.stop(id, StopMode::Cancel, Some(reply));
    }

    fn retry(&mut self, id: DownloadId) -> bool {
        let Some(record) = self.record_mut(id) else {
            return false;
        };
        if !matches!(record.status, Status::Paused | Status::Failed | Status::Completed) {
            return false;
        }
        record.chunks.clear();
        record.total_bytes = 0;
        record.error_message = None;
        tracing::info!(download_id = %id, "download retried");
        // Leftover chunk files must not be appended to.
        let temp_dir = self.options.coordinator.temp_dir.clone();
        let previous = self.stopping.remove(&id);
        let cleanup = tokio::spawn(async move {
            if let Some(prev) = previous {
                let _ = prev.await;
            }
            let _ = tokio::task::spawn_blocking(move || remove_chunk_files(&temp_dir, id)).await;
        });
        self.stopping.insert(id, cleanup);
        self.request_start(id);
        true
    }

    fn apply_event(&mut self, id: DownloadId, event: DownloadEvent) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        let downloading = self.records[idx].status == Status::Downloading;
        match event {
            DownloadEvent::Progress { chunk_id, bytes } => {
                match self.records[idx].chunk_mut(chunk_id) {
                    Some(chunk) => chunk.record_progress(bytes),
                    None if downloading => {
                        *self
                            .pending_progress
                            .entry(id)
                            .or_default()
                            .entry(chunk_id)
                            .or_default() += bytes;
                    }
                    None => {}
                }
            }
            DownloadEvent::ChunkSynced {
                chunk_id,
                bytes_downloaded,
            } => {
                if let Some(chunk) = self.records[idx].chunk_mut(chunk_id) {
                    chunk.bytes_downloaded = 0;
                    chunk.is_completed = false;
                    chunk.record_progress(bytes_downloaded);
                }
            }
            DownloadEvent::ChunkComplete { chunk_id } => {
                if let Some(chunk) = self.records[idx].chunk_mut(chunk_id) {
                    chunk.mark_completed();
                    tracing::debug!(download_id = %id, chunk = chunk_id, "chunk complete");
                    self.save();
                }
            }
            DownloadEvent::Metadata { total_bytes, chunks } if downloading => {
                let record = &mut self.records[idx];
                record.total_bytes = total_bytes;
                record.chunks = chunks;
                if let Some(pending) = self.pending_progress.remove(&id) {
                    for (chunk_id, bytes) in pending {
                        if let Some(chunk) = record.chunk_mut(chunk_id) {
                            chunk.record_progress(bytes);
                        }
                    }
                }
                tracing::info!(
                    download_id = %id,
                    total_bytes,
                    chunks = record.chunks.len(),
                    "download metadata"
                );
                self.last_sample.insert(id, record.total_bytes_downloaded());
                self.save();
            }
            DownloadEvent::AllComplete if downloading => self.begin_merge(idx),
            DownloadEvent::Failed { message } if downloading => {
                let record = &mut self.records[idx];
                record.status = Status::Failed;
                record.error_message = Some(message);
                record.clear_rates();
                self.save();
                self.stop(id, StopMode::Reap, None);
            }
            // Terminal events for a record the user already paused or cancelled.
            DownloadEvent::Metadata { .. } | DownloadEvent::AllComplete | DownloadEvent::Failed { .. } => {}
        }
    }

    fn begin_merge(&mut self, idx: usize) {
        let record = &mut self.records[idx];
        let id = record.id;
        self.coordinators.remove(&id);
        record.status = Status::Merging;
        record.clear_rates();
        if record.total_bytes == 0 {
            // Size learned only by downloading it.
            record.total_bytes = record.total_bytes_downloaded();
        }
        let chunks = ordered_chunk_paths(&self.options.coordinator.temp_dir, id, &record.chunks);
        let destination = record.destination_path.clone();
        tracing::info!(download_id = %id, destination = %destination.display(), "merging chunks");
        self.save();

        let merger = FileMerger::new(self.options.merge_buffer_bytes);
        let tx = self.internal_tx.clone();
        let merge = tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || merger.merge(&chunks, &destination))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));
            let _ = tx.send(Internal::MergeFinished { id, result });
        });
        self.merges.insert(id, merge);
    }

    fn finish_merge(&mut self, id: DownloadId, result: Result<u64, String>) {
        self.merges.remove(&id);
        let Some(record) = self.record_mut(id).filter(|r| r.status == Status::Merging) else {
            return;
        };
        match result {
            Ok(bytes) => {
                record.status = Status::Completed;
                tracing::info!(download_id = %id, bytes, "download completed");
            }
            Err(e) => {
                record.status = Status::Failed;
                record.error_message = Some(format!("Merge failed: {}", e));
                tracing::warn!(download_id = %id, "merge failed: {}", e);
            }
        }
        self.save();
    }

    /// Speed is the byte delta since the previous tick scaled to one second; ETA is
    /// remaining bytes over speed while downloading with a known size.
    fn sample_rates(&mut self) {
        let interval = self.options.progress_interval.as_secs_f64();
        for record in &mut self.records {
            let current = record.total_bytes_downloaded();
            let last = self.last_sample.insert(record.id, current).unwrap_or(current);
            let delta = current.saturating_sub(last);
            record.speed = (delta as f64 / interval) as u64;
            record.eta = if record.status == Status::Downloading && record.speed > 0 && record.total_bytes > 0 {
                record.total_bytes.saturating_sub(current) as f64 / record.speed as f64
            } else {
                0.0
            };
        }
    }

    async fn shutdown(&mut self) {
        let active: Vec<DownloadId> = self
            .records
            .iter()
            .filter(|r| r.status == Status::Downloading)
            .map(|r| r.id)
            .collect();
        for id in active {
            self.pause(id, None);
        }
        // Deferred starts will never run now.
        for r in self.records.iter_mut().filter(|r| r.status == Status::Waiting) {
            r.status = Status::Paused;
        }
        for (_, task) in self.stopping.drain() {
            let _ = task.await;
        }
        // A merge deletes chunk files as it finishes; its record must not be saved
        // as anything but the merge outcome.
        for (_, merge) in self.merges.drain() {
            let _ = merge.await;
        }
        while let Ok(msg) = self.internal.try_recv() {
            self.handle_internal(msg);
        }
        // Apply whatever the stopped workers reported before they exited.
        while let Ok((id, event)) = self.events.try_recv() {
            self.apply_event(id, event);
        }
        self.save();
        tracing::info!(records = self.records.len(), "download manager shut down");
    }
}
