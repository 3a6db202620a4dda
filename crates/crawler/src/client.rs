// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnecting socket client.
//!
//! Connects to the control plane with exponential backoff, polls for
//! jobs while slots are free, and keeps the outbound queue across
//! reconnects so no lifecycle message is lost to a flaky socket.

use crate::config::CrawlerConfig;
use fw_wire::{
    Envelope, FrameBuffer, HeartbeatData, JobCompletedData, JobDescriptor, JobFailedData,
    JobProgressData, JobRequestData, JobResponseData, JobsDiscoveredData, MessageKind,
    ShutdownData, SystemStatus, TokenRefreshRequestData, TokenRefreshResponseData,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const READ_BUF_SIZE: usize = 64 * 1024;
const FRAME_BUF_SIZE: usize = 4 * 1024 * 1024;

struct Shared {
    outbound: Mutex<VecDeque<Envelope>>,
    flush: Notify,
    pending_refresh: Mutex<HashMap<String, oneshot::Sender<TokenRefreshResponseData>>>,
    job_tx: mpsc::UnboundedSender<JobDescriptor>,
    active_jobs: AtomicUsize,
    total_processed: AtomicU64,
    connected: AtomicBool,
}

/// Cloneable façade the task processor talks through.
#[derive(Clone)]
pub struct ClientHandle {
    shared: Arc<Shared>,
    refresh_timeout: Duration,
}

impl ClientHandle {
    /// Queue an envelope; flushed in FIFO order by the client loop.
    pub fn enqueue(&self, envelope: Envelope) {
        self.shared.outbound.lock().push_back(envelope);
        self.shared.flush.notify_one();
    }

    pub fn emit_job_started(&self, job_id: &str) {
        self.enqueue(Envelope::new(MessageKind::JobStarted, Some(job_id.to_string()), json!({})));
    }

    pub fn emit_job_progress(&self, job_id: &str, data: &JobProgressData) {
        if let Ok(value) = serde_json::to_value(data) {
            self.enqueue(Envelope::new(MessageKind::JobProgress, Some(job_id.to_string()), value));
        }
    }

    pub fn emit_job_completed(&self, job_id: &str, data: &JobCompletedData) {
        if let Ok(value) = serde_json::to_value(data) {
            self.enqueue(Envelope::new(MessageKind::JobCompleted, Some(job_id.to_string()), value));
        }
    }

    pub fn emit_job_failed(&self, job_id: &str, data: &JobFailedData) {
        if let Ok(value) = serde_json::to_value(data) {
            self.enqueue(Envelope::new(MessageKind::JobFailed, Some(job_id.to_string()), value));
        }
    }

    pub fn emit_jobs_discovered(&self, job_id: &str, data: &JobsDiscoveredData) {
        if let Ok(value) = serde_json::to_value(data) {
            self.enqueue(Envelope::new(
                MessageKind::JobsDiscovered,
                Some(job_id.to_string()),
                value,
            ));
        }
    }

    /// Ask for a fresh token and wait for the correlated response.
    ///
    /// `None` after the refresh timeout: the caller treats the job as
    /// failed.
    pub async fn request_token_refresh(&self, job_id: &str) -> Option<TokenRefreshResponseData> {
        let (tx, rx) = oneshot::channel();
        self.shared.pending_refresh.lock().insert(job_id.to_string(), tx);
        self.enqueue(Envelope::new(
            MessageKind::TokenRefreshRequest,
            Some(job_id.to_string()),
            serde_json::to_value(TokenRefreshRequestData::default()).unwrap_or_default(),
        ));

        let response = tokio::time::timeout(self.refresh_timeout, rx).await;
        self.shared.pending_refresh.lock().remove(job_id);
        match response {
            Ok(Ok(data)) => Some(data),
            _ => None,
        }
    }

    /// Slot accounting, reflected in heartbeats and the poll loop.
    pub fn job_slot_taken(&self) {
        self.shared.active_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_slot_released(&self, processed: u64) {
        self.shared.active_jobs.fetch_sub(1, Ordering::Relaxed);
        self.shared.total_processed.fetch_add(processed, Ordering::Relaxed);
    }

    pub fn active_jobs(&self) -> usize {
        self.shared.active_jobs.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    pub fn queued_messages(&self) -> usize {
        self.shared.outbound.lock().len()
    }

    /// Drain the outbound queue without a socket; used by tests and the
    /// final flush on shutdown.
    pub fn take_queued(&self) -> Vec<Envelope> {
        self.shared.outbound.lock().drain(..).collect()
    }
}

/// The reconnect/poll/flush loop.
pub struct SocketClient {
    config: CrawlerConfig,
    shared: Arc<Shared>,
}

impl SocketClient {
    pub fn new(config: CrawlerConfig) -> (Self, mpsc::UnboundedReceiver<JobDescriptor>) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            outbound: Mutex::new(VecDeque::new()),
            flush: Notify::new(),
            pending_refresh: Mutex::new(HashMap::new()),
            job_tx,
            active_jobs: AtomicUsize::new(0),
            total_processed: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        });
        (Self { config, shared }, job_rx)
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            shared: Arc::clone(&self.shared),
            refresh_timeout: self.config.token_refresh_timeout(),
        }
    }

    /// Run until cancelled. Reconnects with exponential backoff
    /// (1 s → 30 s); the outbound queue survives each reconnect.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match UnixStream::connect(&self.config.socket_path).await {
                Ok(stream) => {
                    tracing::info!(socket = %self.config.socket_path.display(), "connected");
                    self.shared.connected.store(true, Ordering::Relaxed);
                    backoff = INITIAL_BACKOFF;
                    self.run_connection(stream, &cancel).await;
                    self.shared.connected.store(false, Ordering::Relaxed);
                    tracing::info!("disconnected");
                }
                Err(err) => {
                    tracing::debug!(error = %err, "connect failed");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn run_connection(&self, stream: UnixStream, cancel: &CancellationToken) {
        let (mut reader, mut writer) = stream.into_split();
        let mut frames = FrameBuffer::new(FRAME_BUF_SIZE);
        let mut read_buf = vec![0u8; READ_BUF_SIZE];
        let mut poll_tick = tokio::time::interval(self.config.poll_interval());
        let mut heartbeat_tick = tokio::time::interval(self.config.heartbeat_interval());

        // A reconnect may find messages queued while offline.
        self.shared.flush.notify_one();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = self.flush_outbound(&mut writer).await;
                    return;
                }
                read = reader.read(&mut read_buf) => {
                    let n = match read {
                        Ok(0) => return,
                        Ok(n) => n,
                        Err(err) => {
                            tracing::warn!(error = %err, "read error");
                            return;
                        }
                    };
                    let extracted = match frames.push(&read_buf[..n]) {
                        Ok(extracted) => extracted,
                        Err(err) => {
                            tracing::warn!(error = %err, "inbound framing failure");
                            return;
                        }
                    };
                    for frame in extracted {
                        match Envelope::parse(&frame) {
                            Ok(envelope) => {
                                if !self.dispatch(envelope) {
                                    return;
                                }
                            }
                            Err(err) => tracing::warn!(error = %err, "bad inbound frame"),
                        }
                    }
                }
                _ = self.shared.flush.notified() => {
                    if self.flush_outbound(&mut writer).await.is_err() {
                        return;
                    }
                }
                _ = poll_tick.tick() => {
                    let active = self.shared.active_jobs.load(Ordering::Relaxed);
                    if active < self.config.max_active_jobs {
                        let want = (self.config.max_active_jobs - active) as u32;
                        self.handle().enqueue(Envelope::new(
                            MessageKind::JobRequest,
                            None,
                            serde_json::to_value(JobRequestData { max_jobs: Some(want) })
                                .unwrap_or_default(),
                        ));
                    }
                }
                _ = heartbeat_tick.tick() => {
                    self.handle().enqueue(Envelope::new(
                        MessageKind::Heartbeat,
                        None,
                        serde_json::to_value(self.heartbeat()).unwrap_or_default(),
                    ));
                }
            }
        }
    }

    /// Drain the queue in FIFO order. Entries stay queued until their
    /// write succeeds, so a mid-flush disconnect loses nothing.
    async fn flush_outbound(
        &self,
        writer: &mut (impl AsyncWriteExt + Unpin),
    ) -> Result<(), std::io::Error> {
        loop {
            let Some(envelope) = self.shared.outbound.lock().front().cloned() else {
                return Ok(());
            };
            let bytes = match fw_wire::encode_line(&envelope) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(error = %err, "dropping unserializable envelope");
                    self.shared.outbound.lock().pop_front();
                    continue;
                }
            };
            writer.write_all(&bytes).await?;
            writer.flush().await?;
            self.shared.outbound.lock().pop_front();
        }
    }

    /// Inbound dispatch; returns false when the connection should drop.
    fn dispatch(&self, envelope: Envelope) -> bool {
        match envelope.message_kind() {
            Some(MessageKind::JobResponse) => {
                match envelope.payload::<JobResponseData>(MessageKind::JobResponse) {
                    Ok(data) => {
                        for descriptor in data.jobs {
                            if self.shared.job_tx.send(descriptor).is_err() {
                                tracing::warn!("processor gone; dropping job descriptors");
                                return false;
                            }
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "bad job_response payload"),
                }
                true
            }
            Some(MessageKind::TokenRefreshResponse) => {
                let Some(job_id) = envelope.job_id.clone() else {
                    tracing::warn!("token_refresh_response without jobId");
                    return true;
                };
                match envelope.payload::<TokenRefreshResponseData>(MessageKind::TokenRefreshResponse)
                {
                    Ok(data) => {
                        if let Some(waiter) = self.shared.pending_refresh.lock().remove(&job_id) {
                            let _ = waiter.send(data);
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "bad token_refresh_response payload"),
                }
                true
            }
            Some(MessageKind::Shutdown) => {
                let reason = envelope
                    .payload::<ShutdownData>(MessageKind::Shutdown)
                    .ok()
                    .and_then(|d| d.reason);
                tracing::info!(reason = reason.as_deref().unwrap_or(""), "control plane shutdown");
                false
            }
            other => {
                tracing::debug!(kind = ?other, "ignoring unexpected inbound message");
                true
            }
        }
    }

    fn heartbeat(&self) -> HeartbeatData {
        let active = self.shared.active_jobs.load(Ordering::Relaxed) as u32;
        HeartbeatData {
            active_jobs: active,
            total_processed: self.shared.total_processed.load(Ordering::Relaxed),
            system_status: if active == 0 { SystemStatus::Idle } else { SystemStatus::Processing },
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
