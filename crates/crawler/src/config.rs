// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawler configuration: TOML file plus environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Control-plane socket to connect to.
    pub socket_path: PathBuf,
    /// Where fetched artifacts are written.
    pub data_dir: PathBuf,
    /// HMAC key for the anonymizer. Must match across runs for stable
    /// pseudonyms.
    pub anonymization_secret: String,
    /// Reversible hash→original table; empty disables reversibility.
    pub lookup_db_path: Option<PathBuf>,
    /// Privacy mode: the lookup table becomes a black hole.
    pub lookup_db_disable_io: bool,
    /// Default log filter; `FW_LOG` overrides it.
    pub log_level: String,
    /// Concurrent job slots.
    pub max_active_jobs: usize,
    /// Idle poll period for `job_request`.
    pub poll_interval_ms: u64,
    /// Heartbeat period.
    pub heartbeat_interval_ms: u64,
    /// Items requested per page.
    pub per_page: u32,
    /// Client-side request budgets; 0 disables the window.
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    /// Attempt heuristic JSON repair on unparseable bodies.
    pub repair_json: bool,
    /// How long to wait for a `token_refresh_response`.
    pub token_refresh_timeout_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("fieldworkd.sock"),
            data_dir: PathBuf::from("data"),
            anonymization_secret: String::new(),
            lookup_db_path: None,
            lookup_db_disable_io: false,
            log_level: "info".to_string(),
            max_active_jobs: 3,
            poll_interval_ms: 5_000,
            heartbeat_interval_ms: 10_000,
            per_page: 100,
            max_requests_per_minute: 0,
            max_requests_per_hour: 0,
            repair_json: false,
            token_refresh_timeout_ms: 15_000,
        }
    }
}

impl CrawlerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Apply `FW_*` / `LOOKUP_DB_DISABLE_IO` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("FW_SOCKET") {
            self.socket_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("FW_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(secret) = std::env::var("FW_ANONYMIZATION_SECRET") {
            self.anonymization_secret = secret;
        }
        if let Ok(path) = std::env::var("FW_LOOKUP_DB_PATH") {
            self.lookup_db_path = Some(PathBuf::from(path));
        }
        if let Ok(flag) = std::env::var("LOOKUP_DB_DISABLE_IO") {
            self.lookup_db_disable_io = flag == "true" || flag == "1";
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn token_refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.token_refresh_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
