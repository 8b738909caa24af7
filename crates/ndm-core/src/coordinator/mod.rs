//! Download coordinator: owns the fetch strategy for one download.
//!
//! Probes the resource, plans chunks, runs one [`worker`](crate::worker) per pending
//! chunk, counts completions, and switches to a single unbounded connection when the
//! server rejects parallel ranged access. All bookkeeping sits behind one mutex; every
//! strategy change (fallback, pause, cancel, failure) bumps an epoch so reports from
//! superseded workers are dropped instead of reaching the record owner.

mod events;
mod files;
mod reconcile;
mod state;

pub use events::{event_channel, DownloadEvent, EventReceiver, EventSender};
pub use files::{chunk_file_path, default_temp_dir, ordered_chunk_paths, remove_chunk_files};
pub use reconcile::Adjustment;
pub use state::CoordinatorState;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::fallback::FallbackPolicy;
use crate::headers;
use crate::model::{Chunk, DownloadId};
use crate::partition::PartitionPlan;
use crate::probe::{self, ProbeError, ProbeResult};
use crate::worker::{self, ChunkError, ChunkJob, WorkerHandle, WorkerListener};

/// Settings shared by every coordinator of a manager.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub partition: PartitionPlan,
    pub fallback: FallbackPolicy,
    pub user_agent: String,
    /// Scratch directory for chunk files.
    pub temp_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            partition: PartitionPlan::default(),
            fallback: FallbackPolicy::default(),
            user_agent: headers::DEFAULT_USER_AGENT.to_string(),
            temp_dir: default_temp_dir(),
        }
    }
}

#[derive(Debug, Default)]
struct Request {
    url: String,
    headers: Arc<Vec<(String, String)>>,
}

struct Shared {
    state: CoordinatorState,
    epoch: u64,
    /// Chunks handed to workers by the current strategy.
    dispatched: usize,
    completed: usize,
    /// Set once fallback has been used for this `start()`.
    fallback_latched: bool,
    total_bytes: u64,
    request: Arc<Request>,
    workers: Vec<WorkerHandle>,
}

struct Inner {
    id: DownloadId,
    config: Arc<CoordinatorConfig>,
    events: EventSender,
    shared: Mutex<Shared>,
}

/// Handle to one download's coordinator. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(id: DownloadId, config: Arc<CoordinatorConfig>, events: EventSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                config,
                events,
                shared: Mutex::new(Shared {
                    state: CoordinatorState::Idle,
                    epoch: 0,
                    dispatched: 0,
                    completed: 0,
                    fallback_latched: false,
                    total_bytes: 0,
                    request: Arc::new(Request::default()),
                    workers: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> DownloadId {
        self.inner.id
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.lock().state
    }

    pub fn chunk_file_path(&self, chunk_id: usize) -> PathBuf {
        chunk_file_path(&self.inner.config.temp_dir, self.inner.id, chunk_id)
    }

    /// Starts (or resumes) the download.
    ///
    /// With non-empty `resume` chunks the probe is skipped: chunk files are reconciled
    /// with the recorded counts and only unfinished chunks are fetched. Otherwise the
    /// resource is probed on a background thread first. Returns immediately; progress
    /// arrives as [`DownloadEvent`]s.
    pub fn start(&self, url: &str, custom_headers: &HashMap<String, String>, resume: Option<Vec<Chunk>>) {
        let inner = &self.inner;
        let mut shared = inner.lock();
        if shared.state.is_active() {
            tracing::warn!(download_id = %inner.id, state = ?shared.state, "start ignored: already running");
            return;
        }
        shared.epoch += 1;
        let epoch = shared.epoch;
        shared.fallback_latched = false;
        shared.dispatched = 0;
        shared.completed = 0;
        shared.total_bytes = 0;
        shared.request = Arc::new(Request {
            url: url.to_string(),
            headers: Arc::new(headers::sanitize(custom_headers, &inner.config.user_agent)),
        });

        match resume.filter(|c| !c.is_empty()) {
            Some(mut chunks) => {
                shared.state = CoordinatorState::Fetching;
                shared.total_bytes = chunks
                    .iter()
                    .filter(|c| !c.is_unbounded())
                    .map(|c| c.end_byte + 1)
                    .max()
                    .unwrap_or(0);
                match reconcile::reconcile(&inner.config.temp_dir, inner.id, &mut chunks) {
                    Ok(adjustments) => {
                        for adj in adjustments {
                            inner.emit(match adj {
                                Adjustment::Synced {
                                    chunk_id,
                                    bytes_downloaded,
                                } => DownloadEvent::ChunkSynced {
                                    chunk_id,
                                    bytes_downloaded,
                                },
                                Adjustment::Completed { chunk_id } => DownloadEvent::ChunkComplete { chunk_id },
                            });
                        }
                    }
                    Err(e) => {
                        inner.fail_locked(&mut shared, format!("Chunk file check failed: {}", e));
                        return;
                    }
                }
                tracing::info!(download_id = %inner.id, chunks = chunks.len(), "resuming download");
                inner.dispatch_locked(&mut shared, chunks, None);
            }
            None => {
                shared.state = CoordinatorState::Probing;
                let request = Arc::clone(&shared.request);
                let task = Arc::clone(inner);
                let spawned = std::thread::Builder::new()
                    .name("ndm-probe".to_string())
                    .spawn(move || {
                        let result = probe::probe(&request.url, &request.headers);
                        task.finish_probe(epoch, result);
                    });
                if let Err(e) = spawned {
                    inner.fail_locked(&mut shared, format!("could not start probe: {}", e));
                }
            }
        }
    }

    /// Stops all transfers and keeps chunk files and progress for a later resume.
    /// Blocks until the worker threads have exited.
    pub fn pause(&self) {
        let workers = self.inner.stop(CoordinatorState::Paused);
        for w in workers {
            w.join();
        }
    }

    /// Blocks until workers left behind by a failure have exited, so nothing writes to
    /// the chunk files afterwards. Returns how many were joined.
    pub fn join_workers(&self) -> usize {
        let workers: Vec<WorkerHandle> = self.inner.lock().workers.drain(..).collect();
        let n = workers.len();
        for w in workers {
            w.join();
        }
        n
    }

    /// Stops all transfers and deletes this download's chunk files.
    /// Blocks until the worker threads have exited.
    pub fn cancel(&self) {
        let workers = self.inner.stop(CoordinatorState::Canceled);
        for w in workers {
            w.join();
        }
        if let Err(e) = remove_chunk_files(&self.inner.config.temp_dir, self.inner.id) {
            tracing::warn!(download_id = %self.inner.id, "could not remove chunk files: {}", e);
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DownloadEvent) {
        // A closed channel means the owner is gone; nothing left to update.
        let _ = self.events.send((self.id, event));
    }

    /// Moves to a user-requested terminal state and returns the workers to join.
    fn stop(&self, next: CoordinatorState) -> Vec<WorkerHandle> {
        let mut shared = self.lock();
        if shared.state.is_active() {
            shared.state = next;
        }
        shared.epoch += 1;
        let workers: Vec<WorkerHandle> = shared.workers.drain(..).collect();
        for w in &workers {
            w.cancel();
        }
        tracing::info!(download_id = %self.id, state = ?shared.state, workers = workers.len(), "download stopped");
        workers
    }

    fn finish_probe(self: &Arc<Self>, epoch: u64, result: Result<ProbeResult, ProbeError>) {
        let mut shared = self.lock();
        if shared.epoch != epoch || shared.state != CoordinatorState::Probing {
            return;
        }
        match result {
            Ok(meta) => {
                shared.state = CoordinatorState::Fetching;
                let chunks = self
                    .config
                    .partition
                    .chunks_for(meta.content_length, meta.supports_ranges);
                self.dispatch_locked(&mut shared, chunks, Some(meta.content_length));
            }
            Err(e) if e.is_fallback_eligible(&self.config.fallback) => {
                tracing::info!(download_id = %self.id, "probe rejected ({}), using a single connection", e);
                self.begin_fallback_locked(&mut shared, None);
            }
            Err(e) => self.fail_locked(&mut shared, e.to_string()),
        }
    }

    /// Spawns a worker per unfinished chunk. With `metadata`, the chunk list is emitted
    /// first so the owner has it before any progress for it.
    fn dispatch_locked(self: &Arc<Self>, shared: &mut Shared, chunks: Vec<Chunk>, metadata: Option<u64>) {
        if let Some(total_bytes) = metadata {
            shared.total_bytes = total_bytes;
            self.emit(DownloadEvent::Metadata {
                total_bytes,
                chunks: chunks.clone(),
            });
        }
        let pending: Vec<Chunk> = chunks.into_iter().filter(|c| !c.is_completed).collect();
        shared.dispatched = pending.len();
        shared.completed = 0;
        if pending.is_empty() {
            shared.state = CoordinatorState::Done;
            tracing::info!(download_id = %self.id, "all chunks already complete");
            self.emit(DownloadEvent::AllComplete);
            return;
        }

        let listener: Arc<dyn WorkerListener> = Arc::new(Dispatch {
            inner: Arc::clone(self),
            epoch: shared.epoch,
        });
        for chunk in pending {
            let job = ChunkJob {
                url: shared.request.url.clone(),
                headers: Arc::clone(&shared.request.headers),
                file_path: chunk_file_path(&self.config.temp_dir, self.id, chunk.id),
                chunk,
            };
            match worker::spawn(job, Arc::clone(&listener)) {
                Ok(handle) => shared.workers.push(handle),
                Err(e) => {
                    self.fail_locked(shared, format!("could not start chunk worker: {}", e));
                    return;
                }
            }
        }
        tracing::info!(
            download_id = %self.id,
            chunks = shared.dispatched,
            state = ?shared.state,
            "chunks dispatched"
        );
    }

    /// First hard error wins: cancel the rest and report. The canceled workers stay in
    /// `workers` until [`Coordinator::join_workers`] reaps them.
    fn fail_locked(&self, shared: &mut Shared, message: String) {
        if !shared.state.is_active() {
            return;
        }
        shared.state = CoordinatorState::Failed;
        shared.epoch += 1;
        for w in &shared.workers {
            w.cancel();
        }
        tracing::warn!(download_id = %self.id, "download failed: {}", message);
        self.emit(DownloadEvent::Failed { message });
    }

    /// Cancels every worker, wipes the chunk files, and restarts with one unbounded
    /// chunk. Joining and deleting happen off the caller's thread, which may itself be
    /// one of the workers (`failing_chunk`).
    fn begin_fallback_locked(self: &Arc<Self>, shared: &mut Shared, failing_chunk: Option<usize>) {
        shared.fallback_latched = true;
        shared.state = CoordinatorState::FallbackFetching;
        shared.epoch += 1;
        let epoch = shared.epoch;
        let old: Vec<WorkerHandle> = shared.workers.drain(..).collect();
        for w in &old {
            w.cancel();
        }
        let to_join: Vec<WorkerHandle> = old
            .into_iter()
            .filter(|w| Some(w.chunk_id()) != failing_chunk)
            .collect();

        let task = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("ndm-fallback".to_string())
            .spawn(move || {
                for w in to_join {
                    w.join();
                }
                let removed = remove_chunk_files(&task.config.temp_dir, task.id);
                let mut shared = task.lock();
                if shared.epoch != epoch || shared.state != CoordinatorState::FallbackFetching {
                    return;
                }
                match removed {
                    Ok(n) => {
                        tracing::info!(download_id = %task.id, removed = n, "falling back to a single connection");
                        let total = shared.total_bytes;
                        task.dispatch_locked(&mut shared, vec![Chunk::unbounded()], Some(total));
                    }
                    Err(e) => task.fail_locked(&mut shared, format!("could not remove chunk files: {}", e)),
                }
            });
        if let Err(e) = spawned {
            self.fail_locked(shared, format!("could not start fallback: {}", e));
        }
    }
}

/// Worker listener bound to one epoch of one coordinator.
struct Dispatch {
    inner: Arc<Inner>,
    epoch: u64,
}

impl WorkerListener for Dispatch {
    fn on_progress(&self, chunk_id: usize, bytes: u64) {
        let shared = self.inner.lock();
        if shared.epoch == self.epoch {
            self.inner.emit(DownloadEvent::Progress { chunk_id, bytes });
        }
    }

    fn on_finished(&self, chunk_id: usize, result: Result<(), ChunkError>) {
        let mut shared = self.inner.lock();
        if shared.epoch != self.epoch {
            return;
        }
        match result {
            Ok(()) => {
                shared.completed += 1;
                self.inner.emit(DownloadEvent::ChunkComplete { chunk_id });
                if shared.completed >= shared.dispatched {
                    shared.state = CoordinatorState::Done;
                    shared.workers.clear();
                    tracing::info!(download_id = %self.inner.id, "all chunks complete");
                    self.inner.emit(DownloadEvent::AllComplete);
                }
            }
            Err(e) => {
                let in_flight = shared.dispatched.saturating_sub(shared.completed);
                let eligible = e.is_fallback_eligible(&self.inner.config.fallback);
                if eligible && !shared.fallback_latched && in_flight > 1 {
                    tracing::info!(
                        download_id = %self.inner.id,
                        chunk = chunk_id,
                        "chunk rejected ({}), switching to a single connection",
                        e
                    );
                    self.inner.begin_fallback_locked(&mut shared, Some(chunk_id));
                } else {
                    self.inner
                        .fail_locked(&mut shared, format!("Chunk {} failed: {}", chunk_id, e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Arc<CoordinatorConfig> {
        Arc::new(CoordinatorConfig {
            temp_dir: dir.to_path_buf(),
            ..CoordinatorConfig::default()
        })
    }

    #[test]
    fn resume_with_all_chunks_complete_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = event_channel();
        let id = uuid::Uuid::new_v4();
        let coord = Coordinator::new(id, config(dir.path()), tx);
        let mut chunks = vec![Chunk::new(0, 0, 9), Chunk::new(1, 10, 19)];
        for c in &mut chunks {
            c.mark_completed();
        }
        // Port 9 (discard) on loopback: any request would fail, so success proves none was made.
        coord.start("http://127.0.0.1:9/file", &HashMap::new(), Some(chunks));
        assert_eq!(coord.state(), CoordinatorState::Done);
        let (got_id, event) = rx.try_recv().unwrap();
        assert_eq!(got_id, id);
        assert_eq!(event, DownloadEvent::AllComplete);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resume_counts_full_chunk_files_as_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = event_channel();
        let id = uuid::Uuid::new_v4();
        std::fs::write(chunk_file_path(dir.path(), id, 0), vec![7u8; 10]).unwrap();
        let coord = Coordinator::new(id, config(dir.path()), tx);
        coord.start("http://127.0.0.1:9/file", &HashMap::new(), Some(vec![Chunk::new(0, 0, 9)]));
        let mut events = Vec::new();
        while let Ok((_, e)) = rx.try_recv() {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                DownloadEvent::ChunkSynced {
                    chunk_id: 0,
                    bytes_downloaded: 10
                },
                DownloadEvent::ChunkComplete { chunk_id: 0 },
                DownloadEvent::AllComplete,
            ]
        );
    }

    #[test]
    fn failed_download_keeps_workers_until_joined() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = event_channel();
        let coord = Coordinator::new(uuid::Uuid::new_v4(), config(dir.path()), tx);
        // Nothing listens on port 9: both chunks fail with a transport error.
        coord.start(
            "http://127.0.0.1:9/file",
            &HashMap::new(),
            Some(vec![Chunk::new(0, 0, 9), Chunk::new(1, 10, 19)]),
        );
        let event = loop {
            match rx.try_recv() {
                Ok((_, DownloadEvent::Failed { message })) => break message,
                Ok(_) => {}
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(10)),
            }
        };
        assert!(event.starts_with("Chunk "), "{}", event);
        assert_eq!(coord.state(), CoordinatorState::Failed);
        assert_eq!(coord.join_workers(), 2);
        assert_eq!(coord.join_workers(), 0);
        // The second failure arrived after the epoch moved on and was dropped.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pause_when_idle_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = event_channel();
        let coord = Coordinator::new(uuid::Uuid::new_v4(), config(dir.path()), tx);
        coord.pause();
        assert_eq!(coord.state(), CoordinatorState::Idle);
    }

    #[test]
    fn cancel_deletes_chunk_files() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = event_channel();
        let id = uuid::Uuid::new_v4();
        let coord = Coordinator::new(id, config(dir.path()), tx);
        std::fs::write(coord.chunk_file_path(0), b"abc").unwrap();
        std::fs::write(coord.chunk_file_path(1), b"def").unwrap();
        coord.cancel();
        assert!(!coord.chunk_file_path(0).exists());
        assert!(!coord.chunk_file_path(1).exists());
    }
}
