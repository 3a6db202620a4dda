// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection pool: admission, capacity, cleanup, broadcast.
//!
//! The pool exclusively owns its connections; other components borrow
//! an `Arc<Connection>` per call. The map is mutated only by admission
//! and cleanup; broadcasts work from a snapshot.

use crate::bridge::{AdminBridge, AdminEvent};
use crate::config::ControlConfig;
use crate::connection::{BoxedWriter, Connection, ConnectionState};
use fw_core::Clock;
use fw_wire::Envelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Result of a broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub attempted: usize,
    pub failed: usize,
}

/// Owns every accepted connection.
pub struct ConnectionPool<C: Clock> {
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    next_id: AtomicU64,
    config: ControlConfig,
    bridge: AdminBridge,
    clock: C,
}

impl<C: Clock + 'static> ConnectionPool<C> {
    pub fn new(config: ControlConfig, bridge: AdminBridge, clock: C) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
            bridge,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    pub fn get(&self, id: u64) -> Option<Arc<Connection>> {
        self.connections.lock().get(&id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Admit a new transport, enforcing `max_connections`.
    ///
    /// Over capacity the writer is dropped on the spot (immediate
    /// destroy) and a rejection event fires; the caller must not retain
    /// the read half either.
    pub fn admit(&self, writer: BoxedWriter) -> Option<Arc<Connection>> {
        let now_ms = self.clock.epoch_ms();
        let mut connections = self.connections.lock();
        if connections.len() >= self.config.max_connections {
            self.bridge.publish(AdminEvent::ConnectionRejected {
                active: connections.len(),
                max: self.config.max_connections,
            });
            tracing::warn!(
                active = connections.len(),
                max = self.config.max_connections,
                "connection rejected: pool at capacity"
            );
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(Connection::new(id, writer, self.config.buffer_size, now_ms));
        connection.set_state(ConnectionState::Connected);
        connections.insert(id, Arc::clone(&connection));
        drop(connections);

        self.bridge.publish(AdminEvent::ConnectionAccepted { connection_id: id });
        tracing::info!(connection = id, "connection accepted");
        Some(connection)
    }

    /// Remove one connection from the pool (does not close it).
    pub fn remove(&self, id: u64, reason: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().remove(&id);
        if removed.is_some() {
            self.bridge.publish(AdminEvent::ConnectionRemoved {
                connection_id: id,
                reason: reason.to_string(),
            });
            tracing::info!(connection = id, reason, "connection removed");
        }
        removed
    }

    /// One cleanup tick: drop failed, timed-out, and heartbeat-silent
    /// connections. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now_ms = self.clock.epoch_ms();
        let stale: Vec<Arc<Connection>> = self
            .snapshot()
            .into_iter()
            .filter(|c| {
                c.is_stale(now_ms, self.config.connection_timeout(), self.config.heartbeat_timeout())
            })
            .collect();

        for connection in &stale {
            let reason = match connection.state() {
                ConnectionState::Error => "error",
                ConnectionState::Disconnected => "disconnected",
                _ => {
                    // Timed-out connections pass through ERROR on the way out.
                    connection.set_state(ConnectionState::Error);
                    "timeout"
                }
            };
            self.remove(connection.id(), reason);
            connection.disconnect(reason, self.config.message_timeout()).await;
        }
        stale.len()
    }

    /// Send to every connection; failures are counted, never fatal.
    pub async fn broadcast_all(&self, envelope: &Envelope) -> BroadcastOutcome {
        self.broadcast_filtered(envelope, |_| true).await
    }

    /// Send to connections in `ACTIVE` state only.
    pub async fn broadcast_active(&self, envelope: &Envelope) -> BroadcastOutcome {
        self.broadcast_filtered(envelope, |c| c.state() == ConnectionState::Active).await
    }

    /// Concurrent fan-out to the filtered subset.
    pub async fn broadcast_filtered<F>(&self, envelope: &Envelope, filter: F) -> BroadcastOutcome
    where
        F: Fn(&Connection) -> bool,
    {
        let targets: Vec<Arc<Connection>> =
            self.snapshot().into_iter().filter(|c| filter(c)).collect();
        let attempted = targets.len();

        let mut sends = JoinSet::new();
        for connection in targets {
            let envelope = envelope.clone();
            sends.spawn(async move { connection.send(&envelope).await.is_err() });
        }
        let mut failed = 0;
        while let Some(result) = sends.join_next().await {
            if result.unwrap_or(true) {
                failed += 1;
            }
        }
        BroadcastOutcome { attempted, failed }
    }

    /// Graceful shutdown: close every connection, bounded per send by
    /// `message_timeout`, then clear the pool.
    pub async fn shutdown(&self, reason: &str) {
        let connections: Vec<Arc<Connection>> = {
            let mut map = self.connections.lock();
            map.drain().map(|(_, c)| c).collect()
        };
        let timeout = self.config.message_timeout();

        let mut closes = JoinSet::new();
        for connection in connections {
            let reason = reason.to_string();
            closes.spawn(async move { connection.disconnect(&reason, timeout).await });
        }
        while closes.join_next().await.is_some() {}
        tracing::info!("connection pool drained");
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
