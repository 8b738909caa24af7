//! Download manager: owns every [`DownloadRecord`] and drives coordinators.
//!
//! The records live inside one tokio task (the actor). Callers talk to it through a
//! cloneable [`ManagerHandle`]; coordinators talk to it through the event channel. Only
//! the actor mutates records, so there is no lock around them.

mod actor;
mod naming;

pub use naming::{file_name_for, FALLBACK_FILE_NAME};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::NdmConfig;
use crate::coordinator::CoordinatorConfig;
use crate::model::{DownloadId, DownloadRecord};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("download manager has shut down")]
    Closed,
}

/// Everything the actor needs besides its records.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub coordinator: Arc<CoordinatorConfig>,
    pub merge_buffer_bytes: usize,
    /// Directory for downloads added without an explicit destination.
    pub download_dir: PathBuf,
    pub progress_interval: Duration,
    pub interception_enabled: bool,
    /// `None` keeps records in memory only.
    pub store: Option<Store>,
}

impl ManagerOptions {
    pub fn from_config(cfg: &NdmConfig, store: Option<Store>) -> Self {
        Self {
            coordinator: cfg.coordinator_config(),
            merge_buffer_bytes: cfg.merge_buffer_bytes,
            download_dir: cfg.resolved_download_dir(),
            progress_interval: Duration::from_millis(cfg.progress_interval_ms.max(50)),
            interception_enabled: cfg.chrome_interception_enabled,
            store,
        }
    }
}

/// A new download as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    pub url: String,
    pub file_name: Option<String>,
    pub destination: Option<PathBuf>,
    pub headers: HashMap<String, String>,
}

impl AddRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Add {
        request: AddRequest,
        reply: Option<Reply<DownloadId>>,
    },
    Start(DownloadId, Reply<bool>),
    Pause(DownloadId, Reply<bool>),
    Resume(DownloadId, Reply<bool>),
    Cancel(DownloadId, Reply<bool>),
    Delete(DownloadId, Reply<bool>),
    Retry(DownloadId, Reply<bool>),
    PauseAll(Reply<()>),
    ResumeAll(Reply<()>),
    List(Reply<Vec<DownloadRecord>>),
    Get(DownloadId, Reply<Option<DownloadRecord>>),
    Shutdown(Reply<()>),
}

/// Cloneable front end of the manager actor.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    interception: Arc<AtomicBool>,
}

/// Loads persisted records (interrupted ones come back paused), writes the normalized
/// list back, and spawns the actor on the current tokio runtime.
pub fn spawn(options: ManagerOptions) -> Result<(ManagerHandle, tokio::task::JoinHandle<()>), StoreError> {
    let records = match &options.store {
        Some(store) => {
            let records = store.load()?;
            store.save(&records)?;
            tracing::info!(path = %store.path().display(), records = records.len(), "download list loaded");
            records
        }
        None => Vec::new(),
    };
    Ok(spawn_with_records(options, records))
}

/// Spawns the actor over an explicit record list.
pub fn spawn_with_records(
    options: ManagerOptions,
    records: Vec<DownloadRecord>,
) -> (ManagerHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ManagerHandle {
        commands: tx,
        interception: Arc::new(AtomicBool::new(options.interception_enabled)),
    };
    let task = tokio::spawn(actor::Actor::new(options, records, rx).run());
    (handle, task)
}

impl ManagerHandle {
    fn send(&self, cmd: Command) -> Result<(), ManagerError> {
        self.commands.send(cmd).map_err(|_| ManagerError::Closed)
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| ManagerError::Closed)
    }

    /// Creates a record and starts it. Returns once the record exists.
    pub async fn add(&self, request: AddRequest) -> Result<DownloadId, ManagerError> {
        self.call(|reply| Command::Add {
            request,
            reply: Some(reply),
        })
        .await
    }

    /// Enqueues an add without waiting. Commands are applied in order, so any later
    /// call through a handle observes the new record.
    pub fn submit(&self, request: AddRequest) -> Result<(), ManagerError> {
        self.send(Command::Add { request, reply: None })
    }

    /// Starts a paused or failed record from its recorded chunks. Completed, queued and
    /// running records are left alone.
    pub async fn start(&self, id: DownloadId) -> Result<bool, ManagerError> {
        self.call(|r| Command::Start(id, r)).await
    }

    /// Pauses a downloading record. Returns after its transfers have stopped.
    pub async fn pause(&self, id: DownloadId) -> Result<bool, ManagerError> {
        self.call(|r| Command::Pause(id, r)).await
    }

    /// Restarts a paused or failed record from its recorded chunks.
    pub async fn resume(&self, id: DownloadId) -> Result<bool, ManagerError> {
        self.call(|r| Command::Resume(id, r)).await
    }

    /// Stops the record, deletes its chunk files and marks it failed ("Cancelled").
    pub async fn cancel(&self, id: DownloadId) -> Result<bool, ManagerError> {
        self.call(|r| Command::Cancel(id, r)).await
    }

    /// Cancels and forgets the record.
    pub async fn delete(&self, id: DownloadId) -> Result<bool, ManagerError> {
        self.call(|r| Command::Delete(id, r)).await
    }

    /// Drops all progress and size information and starts over. Only for paused,
    /// failed or completed records.
    pub async fn retry(&self, id: DownloadId) -> Result<bool, ManagerError> {
        self.call(|r| Command::Retry(id, r)).await
    }

    pub async fn pause_all(&self) -> Result<(), ManagerError> {
        self.call(Command::PauseAll).await
    }

    pub async fn resume_all(&self) -> Result<(), ManagerError> {
        self.call(Command::ResumeAll).await
    }

    /// Snapshot of every record, in insertion order.
    pub async fn list(&self) -> Result<Vec<DownloadRecord>, ManagerError> {
        self.call(Command::List).await
    }

    pub async fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>, ManagerError> {
        self.call(|r| Command::Get(id, r)).await
    }

    pub fn interception_enabled(&self) -> bool {
        self.interception.load(Ordering::Relaxed)
    }

    pub fn set_interception_enabled(&self, enabled: bool) {
        self.interception.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "browser interception toggled");
    }

    /// Pauses active downloads, saves, and stops the actor.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        self.call(Command::Shutdown).await
    }
}
