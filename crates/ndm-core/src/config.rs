use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::coordinator::{default_temp_dir, CoordinatorConfig};
use crate::fallback::{FallbackPolicy, DEFAULT_FALLBACK_STATUSES};
use crate::headers::DEFAULT_USER_AGENT;
use crate::merge::DEFAULT_MERGE_BUFFER_BYTES;
use crate::partition::{PartitionPlan, DEFAULT_MAX_SEGMENTS, DEFAULT_MIN_SEGMENT_BYTES};

/// Port the browser extension talks to.
pub const DEFAULT_COMMAND_SERVER_PORT: u16 = 48652;

/// Global configuration loaded from `~/.config/ndm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NdmConfig {
    /// Maximum number of chunks per download.
    pub max_segments: usize,
    /// Smallest chunk worth its own connection, in bytes.
    pub min_segment_bytes: u64,
    /// HTTP statuses that make a multi-chunk download retry over one connection.
    pub fallback_statuses: Vec<u32>,
    /// User-Agent sent when the request carries none.
    pub user_agent: String,
    /// Copy buffer used when merging chunk files.
    pub merge_buffer_bytes: usize,
    /// Loopback port of the command server.
    pub command_server_port: u16,
    /// Whether forwarded browser downloads are accepted.
    pub chrome_interception_enabled: bool,
    /// Where finished files go (None = `~/Downloads`, else the current directory).
    pub download_dir: Option<PathBuf>,
    /// Speed / ETA sampling interval in milliseconds.
    pub progress_interval_ms: u64,
}

impl Default for NdmConfig {
    fn default() -> Self {
        Self {
            max_segments: DEFAULT_MAX_SEGMENTS,
            min_segment_bytes: DEFAULT_MIN_SEGMENT_BYTES,
            fallback_statuses: DEFAULT_FALLBACK_STATUSES.to_vec(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            merge_buffer_bytes: DEFAULT_MERGE_BUFFER_BYTES,
            command_server_port: DEFAULT_COMMAND_SERVER_PORT,
            chrome_interception_enabled: true,
            download_dir: None,
            progress_interval_ms: 500,
        }
    }
}

impl NdmConfig {
    pub fn resolved_download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return dir.clone();
        }
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join("Downloads"),
            None => PathBuf::from("."),
        }
    }

    pub fn coordinator_config(&self) -> Arc<CoordinatorConfig> {
        Arc::new(CoordinatorConfig {
            partition: PartitionPlan {
                min_segment_bytes: self.min_segment_bytes.max(1),
                max_segments: self.max_segments.max(1),
            },
            fallback: FallbackPolicy::new(self.fallback_statuses.clone()),
            user_agent: self.user_agent.clone(),
            temp_dir: default_temp_dir(),
        })
    }
}

/// `~/.config/ndm/config.toml` (the directory is created if missing).
pub fn config_path() -> Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("ndm")?;
    dirs.place_config_file("config.toml")
        .context("create ndm config directory")
}

/// Reads the config file, writing one with default values on first run.
pub fn load_or_init() -> Result<NdmConfig> {
    let path = config_path()?;
    match fs::read_to_string(&path) {
        Ok(text) => toml::from_str(&text).with_context(|| format!("parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let cfg = NdmConfig::default();
            fs::write(&path, toml::to_string_pretty(&cfg)?)
                .with_context(|| format!("write default config {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote default config");
            Ok(cfg)
        }
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}
