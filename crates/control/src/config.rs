// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane configuration.
//!
//! Loaded from a TOML file when present, then overridden by `FW_*`
//! environment variables (see [`crate::env`]).

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

/// Tunables for the socket server and job hand-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Most simultaneous crawler connections; excess is destroyed on accept.
    pub max_connections: usize,
    /// How often crawlers are expected to heartbeat.
    pub heartbeat_interval_ms: u64,
    /// Silence longer than this removes the connection.
    pub heartbeat_timeout_ms: u64,
    /// Inactivity longer than this removes the connection.
    pub connection_timeout_ms: u64,
    /// Bound on a single outbound send during graceful close.
    pub message_timeout_ms: u64,
    /// Per-connection frame buffer capacity in bytes.
    pub buffer_size: usize,
    /// Cleanup scanner period.
    pub cleanup_interval_ms: u64,
    /// Hand recoverable failed jobs back out to crawlers.
    pub send_failed_to_worker: bool,
    /// Cap on jobs returned for one `job_request`.
    pub max_jobs_per_request: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 30_000,
            connection_timeout_ms: 120_000,
            message_timeout_ms: 5_000,
            buffer_size: 1024 * 1024,
            cleanup_interval_ms: 60_000,
            send_failed_to_worker: false,
            max_jobs_per_request: 3,
        }
    }
}

impl ControlConfig {
    /// Read a TOML config file; missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
