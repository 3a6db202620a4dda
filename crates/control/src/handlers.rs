// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in message handlers wired into the router at server assembly.

use crate::bridge::{AdminBridge, AdminEvent};
use crate::connection::Connection;
use crate::discovery::DiscoveryFanout;
use crate::router::{HandlerResult, MessageHandler};
use crate::service::JobService;
use crate::tokens::TokenCoordinator;
use async_trait::async_trait;
use fw_core::Clock;
use fw_wire::{
    Envelope, HeartbeatData, JobCompletedData, JobFailedData, JobProgressData, JobRequestData,
    JobResponseData, JobStartedData, JobsDiscoveredData, MessageKind, SystemStatus,
};
use std::sync::Arc;

fn job_id(envelope: &Envelope) -> &str {
    // The router validated presence for job-scoped kinds.
    envelope.job_id.as_deref().unwrap_or_default()
}

/// Updates heartbeat stats and forwards to the admin bridge.
pub struct HeartbeatHandler<C: Clock> {
    pub bridge: AdminBridge,
    pub clock: C,
}

#[async_trait]
impl<C: Clock + 'static> MessageHandler for HeartbeatHandler<C> {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::Heartbeat]
    }

    async fn handle(&self, connection: &Arc<Connection>, envelope: &Envelope) -> HandlerResult {
        let data: HeartbeatData = match envelope.payload(MessageKind::Heartbeat) {
            Ok(data) => data,
            Err(err) => return HandlerResult::fail(err.to_string()),
        };
        connection.note_heartbeat(self.clock.epoch_ms(), data.system_status == SystemStatus::Idle);
        self.bridge.publish(AdminEvent::heartbeat(connection.id(), &data));
        HandlerResult::ok()
    }
}

/// Hands queued jobs out in response to `job_request`.
pub struct JobRequestHandler<C: Clock> {
    pub service: Arc<JobService<C>>,
}

#[async_trait]
impl<C: Clock + 'static> MessageHandler for JobRequestHandler<C> {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::JobRequest]
    }

    async fn handle(&self, connection: &Arc<Connection>, envelope: &Envelope) -> HandlerResult {
        let request: JobRequestData =
            envelope.payload(MessageKind::JobRequest).unwrap_or_default();
        let jobs = match self.service.get_available(request.max_jobs) {
            Ok(jobs) => jobs,
            Err(err) => return HandlerResult::fail(err.to_string()),
        };
        let response = Envelope::new(
            MessageKind::JobResponse,
            None,
            match serde_json::to_value(JobResponseData { jobs }) {
                Ok(value) => value,
                Err(err) => return HandlerResult::fail(err.to_string()),
            },
        );
        match connection.send(&response).await {
            Ok(_) => HandlerResult::ok(),
            Err(err) => HandlerResult::fail(err.to_string()),
        }
    }
}

/// `job_started` / `job_progress` / `job_completed` / `job_failed`.
pub struct JobLifecycleHandler<C: Clock> {
    pub service: Arc<JobService<C>>,
}

#[async_trait]
impl<C: Clock + 'static> MessageHandler for JobLifecycleHandler<C> {
    fn kinds(&self) -> &'static [MessageKind] {
        &[
            MessageKind::JobStarted,
            MessageKind::JobProgress,
            MessageKind::JobCompleted,
            MessageKind::JobFailed,
        ]
    }

    async fn handle(&self, connection: &Arc<Connection>, envelope: &Envelope) -> HandlerResult {
        let id = job_id(envelope);
        let outcome = match envelope.message_kind() {
            Some(MessageKind::JobStarted) => envelope
                .payload::<JobStartedData>(MessageKind::JobStarted)
                .map_err(|e| e.to_string())
                .and_then(|data| {
                    self.service
                        .mark_started(id, connection.id(), data.metadata)
                        .map_err(|e| e.to_string())
                }),
            Some(MessageKind::JobProgress) => envelope
                .payload::<JobProgressData>(MessageKind::JobProgress)
                .map_err(|e| e.to_string())
                .and_then(|data| {
                    self.service
                        .update_progress(id, data, connection.id())
                        .map_err(|e| e.to_string())
                }),
            Some(MessageKind::JobCompleted) => envelope
                .payload::<JobCompletedData>(MessageKind::JobCompleted)
                .map_err(|e| e.to_string())
                .and_then(|data| self.service.mark_completed(id, data).map_err(|e| e.to_string())),
            Some(MessageKind::JobFailed) => envelope
                .payload::<JobFailedData>(MessageKind::JobFailed)
                .map_err(|e| e.to_string())
                .and_then(|data| self.service.mark_failed(id, data).map_err(|e| e.to_string())),
            _ => Err("not a lifecycle message".to_string()),
        };
        match outcome {
            Ok(()) => HandlerResult::ok(),
            Err(error) => {
                tracing::warn!(job = id, error, "lifecycle update rejected");
                HandlerResult::fail(error)
            }
        }
    }
}

/// Fans `jobs_discovered` out into collection jobs.
pub struct JobsDiscoveredHandler<C: Clock> {
    pub fanout: Arc<DiscoveryFanout<C>>,
}

#[async_trait]
impl<C: Clock + 'static> MessageHandler for JobsDiscoveredHandler<C> {
    fn kinds(&self) -> &'static [MessageKind] {
        // `discovery` is the legacy spelling of the same payload.
        &[MessageKind::JobsDiscovered, MessageKind::Discovery]
    }

    async fn handle(&self, _connection: &Arc<Connection>, envelope: &Envelope) -> HandlerResult {
        let data: JobsDiscoveredData = match envelope.payload(MessageKind::JobsDiscovered) {
            Ok(data) => data,
            Err(err) => return HandlerResult::fail(err.to_string()),
        };
        match self.fanout.process(job_id(envelope), &data) {
            Ok(_) => HandlerResult::ok(),
            Err(err) => HandlerResult::fail(err.to_string()),
        }
    }
}

/// Delegates `token_refresh_request` to the coordinator.
pub struct TokenRefreshHandler<C: Clock> {
    pub coordinator: Arc<TokenCoordinator<C>>,
}

#[async_trait]
impl<C: Clock + 'static> MessageHandler for TokenRefreshHandler<C> {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::TokenRefreshRequest]
    }

    async fn handle(&self, connection: &Arc<Connection>, envelope: &Envelope) -> HandlerResult {
        match self.coordinator.handle_request(connection, job_id(envelope)).await {
            Ok(()) => HandlerResult::ok(),
            Err(err) => HandlerResult::fail(err.to_string()),
        }
    }
}
