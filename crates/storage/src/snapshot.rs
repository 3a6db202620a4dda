// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! A snapshot is the complete materialized state at a WAL sequence,
//! zstd-compressed JSON. Recovery loads the snapshot and replays WAL
//! entries after its sequence.

use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;
const MAX_BAK_FILES: u32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

/// Complete state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    /// WAL sequence covered by this snapshot
    pub seq: u64,
    pub state: MaterializedState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, state: MaterializedState) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, state, created_at: Utc::now() }
    }

    /// Write atomically: tmp file, fsync via close, rename over target.
    /// The previous snapshot rotates to `.bak`.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &compressed)?;
        if path.exists() {
            let _ = fs::rename(path, rotate_bak_path(path));
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }
        let compressed = fs::read(path)?;
        let json = zstd::decode_all(compressed.as_slice())?;
        let snapshot: Snapshot = serde_json::from_slice(&json)?;
        if snapshot.version > CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        Ok(Some(snapshot))
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
