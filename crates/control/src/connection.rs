// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One accepted crawler socket: state, framing, stats, heartbeats.
//!
//! Reads are driven by the pool's per-connection task feeding [`Connection::feed`];
//! writes serialize through one async mutex so frames never interleave.

use fw_wire::{encode_line, CodecError, Envelope, FrameBuffer, MessageKind, ShutdownData};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Connection lifecycle. `Error` and `Disconnected` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Active,
    Idle,
    Disconnecting,
    Disconnected,
    Error,
}

fw_core::simple_display! {
    ConnectionState {
        Connecting => "CONNECTING",
        Connected => "CONNECTED",
        Active => "ACTIVE",
        Idle => "IDLE",
        Disconnecting => "DISCONNECTING",
        Disconnected => "DISCONNECTED",
        Error => "ERROR",
    }
}

impl ConnectionState {
    fn is_absorbing(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }

    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Disconnecting | ConnectionState::Disconnected | ConnectionState::Error
        )
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is not writable")]
    NotWritable,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Point-in-time counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConnectionStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
    errors: AtomicU64,
}

/// Write half of an accepted transport, type-erased so the pool works
/// over Unix sockets in production and duplex pipes in tests.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An in-memory record per accepted socket. Never persisted.
pub struct Connection {
    id: u64,
    writer: tokio::sync::Mutex<BoxedWriter>,
    state: Mutex<ConnectionState>,
    frames: Mutex<FrameBuffer>,
    connected_at_ms: u64,
    last_activity_ms: AtomicU64,
    last_heartbeat_ms: AtomicU64,
    counters: Counters,
    crawler_id: Mutex<Option<String>>,
}

impl Connection {
    pub fn new(id: u64, writer: BoxedWriter, buffer_size: usize, now_ms: u64) -> Self {
        Self {
            id,
            writer: tokio::sync::Mutex::new(writer),
            state: Mutex::new(ConnectionState::Connecting),
            frames: Mutex::new(FrameBuffer::new(buffer_size)),
            connected_at_ms: now_ms,
            last_activity_ms: AtomicU64::new(now_ms),
            last_heartbeat_ms: AtomicU64::new(now_ms),
            counters: Counters::default(),
            crawler_id: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connected_at_ms(&self) -> u64 {
        self.connected_at_ms
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Absorbing states never change again.
    pub fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if state.is_absorbing() {
            return;
        }
        *state = next;
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_in: self.counters.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.counters.bytes_out.load(Ordering::Relaxed),
            messages_in: self.counters.messages_in.load(Ordering::Relaxed),
            messages_out: self.counters.messages_out.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn crawler_id(&self) -> Option<String> {
        self.crawler_id.lock().clone()
    }

    pub fn set_crawler_id(&self, id: impl Into<String>) {
        let mut slot = self.crawler_id.lock();
        if slot.is_none() {
            *slot = Some(id.into());
        }
    }

    /// Record a heartbeat and flip between active and idle.
    pub fn note_heartbeat(&self, now_ms: u64, idle: bool) {
        self.last_heartbeat_ms.store(now_ms, Ordering::Relaxed);
        let next = if idle { ConnectionState::Idle } else { ConnectionState::Active };
        let mut state = self.state.lock();
        if matches!(*state, ConnectionState::Active | ConnectionState::Idle) {
            *state = next;
        }
    }

    /// Feed raw socket bytes; returns every complete envelope.
    ///
    /// Frames that are not envelopes (no `type`, not an object) are
    /// counted as errors and skipped. A framing failure is fatal: the
    /// connection moves to `Error` and the pool removes it.
    pub fn feed(&self, chunk: &[u8], now_ms: u64) -> Result<Vec<Envelope>, ConnectionError> {
        self.last_activity_ms.store(now_ms, Ordering::Relaxed);
        self.counters.bytes_in.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Connecting | ConnectionState::Connected) {
                *state = ConnectionState::Active;
            }
        }

        let frames = match self.frames.lock().push(chunk) {
            Ok(frames) => frames,
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.set_state(ConnectionState::Error);
                return Err(err.into());
            }
        };

        let mut envelopes = Vec::with_capacity(frames.len());
        for frame in frames {
            match Envelope::parse(&frame) {
                Ok(envelope) => {
                    self.counters.messages_in.fetch_add(1, Ordering::Relaxed);
                    envelopes.push(envelope);
                }
                Err(err) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        connection = self.id,
                        error = %err,
                        frame = fw_core::short(&frame, 120),
                        "rejected frame without a valid envelope"
                    );
                }
            }
        }
        Ok(envelopes)
    }

    /// Serialize and write one envelope, newline-terminated.
    pub async fn send(&self, envelope: &Envelope) -> Result<usize, ConnectionError> {
        if !self.state().is_live() {
            return Err(ConnectionError::NotWritable);
        }
        let bytes = encode_line(envelope)?;
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(&bytes).await?;
            writer.flush().await?;
            Ok::<_, std::io::Error>(bytes.len())
        }
        .await;
        drop(writer);
        match result {
            Ok(n) => {
                self.counters.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
                self.counters.messages_out.fetch_add(1, Ordering::Relaxed);
                Ok(n)
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.set_state(ConnectionState::Error);
                Err(err.into())
            }
        }
    }

    /// Graceful close: a shutdown frame bounded by `message_timeout`,
    /// then the transport is torn down either way.
    pub async fn disconnect(&self, reason: &str, message_timeout: Duration) {
        let was_live = self.state().is_live();
        self.set_state(ConnectionState::Disconnecting);
        if was_live {
            let goodbye = Envelope::new(
                MessageKind::Shutdown,
                None,
                serde_json::to_value(ShutdownData { reason: Some(reason.to_string()) })
                    .unwrap_or_default(),
            );
            let send = async {
                let bytes = encode_line(&goodbye)?;
                let mut writer = self.writer.lock().await;
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                Ok::<_, ConnectionError>(())
            };
            if tokio::time::timeout(message_timeout, send).await.is_err() {
                tracing::debug!(connection = self.id, "shutdown frame timed out, destroying");
            }
        }
        let _ = self.writer.lock().await.shutdown().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Whether the cleanup scanner should remove this connection.
    pub fn is_stale(&self, now_ms: u64, connection_timeout: Duration, heartbeat_timeout: Duration) -> bool {
        if self.state().is_absorbing() {
            return true;
        }
        let idle_for = now_ms.saturating_sub(self.last_activity_ms());
        let silent_for = now_ms.saturating_sub(self.last_heartbeat_ms());
        idle_for > connection_timeout.as_millis() as u64
            || silent_for > heartbeat_timeout.as_millis() as u64
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
