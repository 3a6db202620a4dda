// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of store events.
//!
//! One JSON entry per line: `{"seq":N,"event":{...}}`. A batch append
//! is one buffered write followed by one flush, so a fan-out either
//! lands whole or (on a crash mid-write) is dropped whole at replay by
//! the trailing-corruption check.

use crate::event::StoreEvent;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt WAL entry at line {line}")]
    Corrupt { line: usize },
}

/// One durable log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: StoreEvent,
}

/// Append-only event log.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
}

impl Wal {
    /// Open (creating if absent) and position after the last entry.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        let write_seq = last_seq(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), writer: BufWriter::new(file), write_seq })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Append a batch of events as one write + one flush.
    pub fn append_batch(&mut self, events: &[StoreEvent]) -> Result<u64, WalError> {
        let mut buf = Vec::new();
        for event in events {
            self.write_seq += 1;
            let entry = WalEntry { seq: self.write_seq, event: event.clone() };
            serde_json::to_writer(&mut buf, &entry)?;
            buf.push(b'\n');
        }
        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        Ok(self.write_seq)
    }

    /// Read every entry with `seq > after`, tolerating a torn final line.
    pub fn replay_after(path: &Path, after: u64) -> Result<Vec<WalEntry>, WalError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut lines = reader.lines().enumerate().peekable();
        while let Some((idx, line)) = lines.next() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry>(&line) {
                Ok(entry) => {
                    if entry.seq > after {
                        entries.push(entry);
                    }
                }
                Err(_) if lines.peek().is_none() => {
                    // Torn tail from a crash mid-write; recovery drops it.
                    tracing::warn!(line = idx + 1, "dropping torn WAL tail");
                }
                Err(_) => return Err(WalError::Corrupt { line: idx + 1 }),
            }
        }
        Ok(entries)
    }

    /// Truncate after a snapshot made every entry redundant.
    pub fn reset(&mut self, seq: u64) -> Result<(), WalError> {
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.write_seq = seq;
        Ok(())
    }
}

fn last_seq(path: &Path) -> Result<u64, WalError> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    let mut seq = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<WalEntry>(&line) {
            seq = entry.seq;
        }
    }
    Ok(seq)
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
