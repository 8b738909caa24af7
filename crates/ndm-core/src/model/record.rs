//! Download record: everything the manager knows about one download.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::{Chunk, Status};

/// Stable download identifier.
pub type DownloadId = uuid::Uuid;

/// One download as persisted in `downloads.json`.
///
/// `speed` and `eta` are runtime-only samples and are never written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub url: String,
    pub file_name: String,
    pub date_added: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub total_bytes: u64,
    /// Ordered by chunk id.
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub destination_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Per-request header overrides forwarded to the probe and every chunk request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Bytes per second, sampled by the manager.
    #[serde(skip)]
    pub speed: u64,
    /// Estimated seconds remaining.
    #[serde(skip)]
    pub eta: f64,
}

impl DownloadRecord {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>, destination_path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            url: url.into(),
            file_name: file_name.into(),
            date_added: Utc::now(),
            status: Status::Waiting,
            total_bytes: 0,
            chunks: Vec::new(),
            destination_path,
            error_message: None,
            headers: HashMap::new(),
            speed: 0,
            eta: 0.0,
        }
    }

    pub fn total_bytes_downloaded(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes_downloaded).sum()
    }

    /// Overall fraction in [0.0, 1.0]; 0 while the size is unknown.
    pub fn overall_progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.total_bytes_downloaded() as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn chunk_mut(&mut self, chunk_id: usize) -> Option<&mut Chunk> {
        self.chunks.iter_mut().find(|c| c.id == chunk_id)
    }

    pub fn clear_rates(&mut self) {
        self.speed = 0;
        self.eta = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_chunks() -> DownloadRecord {
        let mut r = DownloadRecord::new("https://x/y.zip", "y.zip", PathBuf::from("/tmp/y.zip"));
        r.total_bytes = 400;
        r.chunks = vec![Chunk::new(0, 0, 199), Chunk::new(1, 200, 399)];
        r
    }

    #[test]
    fn derived_progress() {
        let mut r = record_with_chunks();
        assert_eq!(r.overall_progress(), 0.0);
        r.chunk_mut(0).unwrap().record_progress(100);
        r.chunk_mut(1).unwrap().record_progress(100);
        assert_eq!(r.total_bytes_downloaded(), 200);
        assert!((r.overall_progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_size_has_zero_progress() {
        let mut r = DownloadRecord::new("https://x/y", "y", PathBuf::from("y"));
        r.chunks = vec![Chunk::unbounded()];
        r.chunk_mut(0).unwrap().record_progress(42);
        assert_eq!(r.overall_progress(), 0.0);
        assert_eq!(r.total_bytes_downloaded(), 42);
    }

    #[test]
    fn runtime_fields_not_serialized() {
        let mut r = record_with_chunks();
        r.speed = 1234;
        r.eta = 9.0;
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("speed").is_none());
        assert!(json.get("eta").is_none());
        assert!(json.get("errorMessage").is_none());
        assert!(json.get("headers").is_none());
        assert_eq!(json["fileName"], "y.zip");
        assert_eq!(json["destinationPath"], "/tmp/y.zip");
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["totalBytes"], 400);
    }

    #[test]
    fn parses_record_written_by_other_clients() {
        let json = r#"{
            "id": "0B5E4B5E-8F7B-4C21-9C4B-6C1F0A3D9E11",
            "url": "https://example.com/big.iso",
            "fileName": "big.iso",
            "dateAdded": "2024-05-01T10:20:30Z",
            "status": "downloading",
            "totalBytes": 1024,
            "chunks": [
                {"id": 0, "startByte": 0, "endByte": 511, "bytesDownloaded": 511, "isCompleted": true},
                {"id": 1, "startByte": 512, "endByte": 1023, "bytesDownloaded": 12, "isCompleted": false}
            ],
            "destinationPath": "/home/u/Downloads/big.iso",
            "errorMessage": "HTTP error 500"
        }"#;
        let r: DownloadRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.status, Status::Downloading);
        assert_eq!(r.chunks.len(), 2);
        assert_eq!(r.total_bytes_downloaded(), 523);
        assert_eq!(r.error_message.as_deref(), Some("HTTP error 500"));
        assert_eq!(r.speed, 0);
    }
}
