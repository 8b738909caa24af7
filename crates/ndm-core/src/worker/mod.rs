//! Chunk worker: one curl transfer for one byte range, appended to a chunk file.
//!
//! Each worker runs on its own OS thread. Received spans are appended to the
//! chunk file and reported to a [`WorkerListener`]. Cancellation is cooperative:
//! the token is checked from the write and progress callbacks (libcurl keeps calling
//! the latter on stalled connections), the transfer is aborted, and nothing is
//! reported afterwards.

mod error;

pub use error::ChunkError;

use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::headers;
use crate::model::Chunk;
use crate::probe::status_code;

/// Receives progress and the final outcome of a chunk transfer.
///
/// Called from the worker thread. `on_finished` is not called after cancellation.
pub trait WorkerListener: Send + Sync {
    fn on_progress(&self, chunk_id: usize, bytes: u64);
    fn on_finished(&self, chunk_id: usize, result: Result<(), ChunkError>);
}

/// Shared cancellation flag for one worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs to fetch one chunk.
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub url: String,
    /// Already sanitized (see [`crate::headers::sanitize`]).
    pub headers: Arc<Vec<(String, String)>>,
    /// Snapshot of the chunk; `bytes_downloaded` is the resume point.
    pub chunk: Chunk,
    pub file_path: PathBuf,
}

/// Handle to a running worker thread.
pub struct WorkerHandle {
    chunk_id: usize,
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn chunk_id(&self) -> usize {
        self.chunk_id
    }

    /// Request the transfer to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker thread to exit (after `cancel`, within about a second).
    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::warn!(chunk = self.chunk_id, "chunk worker panicked");
        }
    }
}

/// Starts a worker thread for `job`.
pub fn spawn(job: ChunkJob, listener: Arc<dyn WorkerListener>) -> std::io::Result<WorkerHandle> {
    let chunk_id = job.chunk.id;
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let thread = std::thread::Builder::new()
        .name(format!("ndm-chunk-{}", chunk_id))
        .spawn(move || {
            if let Some(result) = run(&job, &token, listener.as_ref()) {
                if !token.is_canceled() {
                    listener.on_finished(chunk_id, result);
                }
            }
        })?;
    Ok(WorkerHandle {
        chunk_id,
        cancel,
        thread,
    })
}

fn open_chunk_file(job: &ChunkJob) -> std::io::Result<File> {
    if let Some(parent) = job.file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Append mode: every write lands at end-of-file, matching `bytes_downloaded`.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&job.file_path)
}

/// Per-transfer state shared by the libcurl callbacks.
struct TransferState<'a> {
    chunk_id: usize,
    cancel: &'a CancelToken,
    listener: &'a dyn WorkerListener,
    /// Bytes the range asks for; `None` for unbounded chunks.
    expected: Option<u64>,
    /// A 200 here means the server sent the body from byte 0, not from our offset.
    ranged_from_middle: bool,
    status: Cell<u32>,
    received: Cell<u64>,
    failure: RefCell<Option<ChunkError>>,
}

impl TransferState<'_> {
    fn fail(&self, e: ChunkError) -> Result<usize, curl::easy::WriteError> {
        self.failure.borrow_mut().get_or_insert(e);
        // Returning fewer bytes than given makes libcurl abort with a write error.
        Ok(0)
    }

    fn on_data(&self, file: &mut File, data: &[u8]) -> Result<usize, curl::easy::WriteError> {
        if self.cancel.is_canceled() {
            return Ok(0);
        }
        let code = self.status.get();
        if !(200..300).contains(&code) {
            return self.fail(ChunkError::Http(code));
        }
        if code == 200 && self.ranged_from_middle {
            return self.fail(ChunkError::RangeIgnored);
        }
        let len = data.len() as u64;
        if let Some(exp) = self.expected {
            if self.received.get() + len > exp {
                return self.fail(ChunkError::RangeIgnored);
            }
        }
        if let Err(e) = file.write_all(data) {
            return self.fail(ChunkError::Io(e));
        }
        self.received.set(self.received.get() + len);
        self.listener.on_progress(self.chunk_id, len);
        Ok(data.len())
    }
}

fn configure(job: &ChunkJob) -> Result<curl::easy::Easy, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(&job.url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    // Enables the progress callback, used as the cancellation poll.
    easy.progress(true)?;
    if let Some(range) = job.chunk.missing_range() {
        easy.range(&range)?;
    }
    easy.http_headers(headers::to_curl_list(&job.headers)?)?;
    Ok(easy)
}

fn perform(
    easy: &mut curl::easy::Easy,
    file: &mut File,
    state: &TransferState<'_>,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|line| {
        if let Some(code) = str::from_utf8(line).ok().and_then(status_code) {
            state.status.set(code);
        }
        true
    })?;
    transfer.write_function(|data| state.on_data(file, data))?;
    transfer.progress_function(|_, _, _, _| !state.cancel.is_canceled())?;
    transfer.perform()
}

/// Runs the transfer on the current thread. `None` means it was canceled.
pub(crate) fn run(
    job: &ChunkJob,
    cancel: &CancelToken,
    listener: &dyn WorkerListener,
) -> Option<Result<(), ChunkError>> {
    let chunk_id = job.chunk.id;
    let mut file = match open_chunk_file(job) {
        Ok(f) => f,
        Err(e) => return Some(Err(ChunkError::Io(e))),
    };
    if cancel.is_canceled() {
        return None;
    }
    let mut easy = match configure(job) {
        Ok(e) => e,
        Err(e) => return Some(Err(ChunkError::Transport(e))),
    };

    let state = TransferState {
        chunk_id,
        cancel,
        listener,
        expected: job.chunk.remaining(),
        ranged_from_middle: !job.chunk.is_unbounded() && job.chunk.resume_offset() > 0,
        status: Cell::new(0),
        received: Cell::new(0),
        failure: RefCell::new(None),
    };
    let performed = perform(&mut easy, &mut file, &state);

    if cancel.is_canceled() {
        tracing::debug!(chunk = chunk_id, "chunk transfer canceled");
        return None;
    }
    if let Some(f) = state.failure.take() {
        return Some(Err(f));
    }
    if let Err(e) = performed {
        return Some(Err(ChunkError::Transport(e)));
    }

    let code = match easy.response_code() {
        Ok(c) => c,
        Err(e) => return Some(Err(ChunkError::Transport(e))),
    };
    if !(200..300).contains(&code) {
        return Some(Err(ChunkError::Http(code)));
    }
    let received = state.received.get();
    if let Some(expected) = state.expected {
        if received != expected {
            return Some(Err(ChunkError::PartialTransfer { expected, received }));
        }
    }
    if let Err(e) = file.sync_data() {
        return Some(Err(ChunkError::Io(e)));
    }
    tracing::debug!(chunk = chunk_id, bytes = received, "chunk transfer complete");
    Some(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let t = CancelToken::new();
        let t2 = t.clone();
        assert!(!t2.is_canceled());
        t.cancel();
        assert!(t2.is_canceled());
    }

    struct Nop;

    impl WorkerListener for Nop {
        fn on_progress(&self, _: usize, _: u64) {}
        fn on_finished(&self, _: usize, _: Result<(), ChunkError>) {}
    }

    #[test]
    fn canceled_before_start_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let job = ChunkJob {
            url: "http://127.0.0.1:9/".to_string(),
            headers: Arc::new(Vec::new()),
            chunk: Chunk::new(0, 0, 9),
            file_path: dir.path().join("c0"),
        };
        let token = CancelToken::new();
        token.cancel();
        assert!(run(&job, &token, &Nop).is_none());
        // The chunk file is created up front so a resume can reconcile against it.
        assert!(job.file_path.exists());
    }

    #[test]
    fn unopenable_chunk_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let job = ChunkJob {
            url: "http://127.0.0.1:9/".to_string(),
            headers: Arc::new(Vec::new()),
            chunk: Chunk::new(0, 0, 9),
            file_path: blocker.join("c0"),
        };
        match run(&job, &CancelToken::new(), &Nop) {
            Some(Err(ChunkError::Io(_))) => {}
            other => panic!("expected Io error, got {:?}", other.map(|r| r.is_ok())),
        }
    }
}
