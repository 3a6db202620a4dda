// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin event bridge: multiplexes lifecycle events to observers.
//!
//! Single-writer broadcast. Observers subscribe and drop freely; a slow
//! observer lags and misses events rather than blocking the publisher.

use fw_core::JobId;
use fw_wire::{HeartbeatData, SystemStatus};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Lifecycle events republished to admin observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdminEvent {
    ConnectionAccepted { connection_id: u64 },
    ConnectionRejected { active: usize, max: usize },
    ConnectionRemoved { connection_id: u64, reason: String },
    Heartbeat { connection_id: u64, active_jobs: u32, system_status: SystemStatus },
    JobStarted { job_id: JobId, connection_id: u64 },
    JobProgress { job_id: JobId, overall_completion: f64 },
    JobCompleted { job_id: JobId, success: bool },
    JobFailed { job_id: JobId, recoverable: bool },
    JobsDiscovered { job_id: JobId, spawned: usize, dropped: usize },
    TokenRefreshed { job_id: JobId, successful: bool },
}

impl AdminEvent {
    pub fn heartbeat(connection_id: u64, data: &HeartbeatData) -> Self {
        AdminEvent::Heartbeat {
            connection_id,
            active_jobs: data.active_jobs,
            system_status: data.system_status,
        }
    }
}

/// Broadcast fan-out to admin observers.
#[derive(Clone)]
pub struct AdminBridge {
    tx: broadcast::Sender<AdminEvent>,
}

impl AdminBridge {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current observers. Dropped when nobody listens.
    pub fn publish(&self, event: AdminEvent) {
        tracing::debug!(?event, "admin event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdminEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AdminBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
