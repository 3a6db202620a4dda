// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message envelope shared by every frame on the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Known message types, in wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    // crawler → control plane
    Heartbeat,
    JobRequest,
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobsDiscovered,
    TokenRefreshRequest,
    /// Legacy spelling of [`MessageKind::JobsDiscovered`] still sent by
    /// older crawler builds.
    Discovery,
    // control plane → crawler
    JobResponse,
    TokenRefreshResponse,
    Shutdown,
}

fw_core::simple_display! {
    MessageKind {
        Heartbeat => "heartbeat",
        JobRequest => "job_request",
        JobStarted => "job_started",
        JobProgress => "job_progress",
        JobCompleted => "job_completed",
        JobFailed => "job_failed",
        JobsDiscovered => "jobs_discovered",
        TokenRefreshRequest => "token_refresh_request",
        Discovery => "discovery",
        JobResponse => "job_response",
        TokenRefreshResponse => "token_refresh_response",
        Shutdown => "shutdown",
    }
}

impl MessageKind {
    /// Parse the wire spelling; `None` for unknown types.
    pub fn from_wire(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_string())).ok()
    }

    /// Whether the envelope must carry a `jobId` for this type.
    pub fn requires_job_id(&self) -> bool {
        matches!(
            self,
            MessageKind::JobStarted
                | MessageKind::JobProgress
                | MessageKind::JobCompleted
                | MessageKind::JobFailed
                | MessageKind::JobsDiscovered
                | MessageKind::Discovery
                | MessageKind::TokenRefreshRequest
                | MessageKind::TokenRefreshResponse
        )
    }
}

/// Envelope validation and payload decoding failures.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("message type {0} requires a jobId")]
    MissingJobId(MessageKind),

    #[error("invalid {kind} payload: {source}")]
    BadPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

/// `{ type, timestamp, jobId?, data }`.
///
/// The type is kept as the raw string so unknown types can be routed to
/// a no-handler rejection (and logged verbatim) instead of failing the
/// whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(rename = "jobId", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope stamped with the current wall-clock time.
    pub fn new(kind: MessageKind, job_id: Option<String>, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            job_id,
            data,
        }
    }

    /// Parse a frame into an envelope. Fails when `type` is absent or
    /// the frame is not a JSON object.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// The typed message kind, if the type string is known.
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_wire(&self.kind)
    }

    /// Enforce the per-type envelope schema.
    pub fn validate(&self, kind: MessageKind) -> Result<(), EnvelopeError> {
        if kind.requires_job_id() && self.job_id.as_deref().unwrap_or("").is_empty() {
            return Err(EnvelopeError::MissingJobId(kind));
        }
        Ok(())
    }

    /// Decode `data` into a typed payload.
    pub fn payload<T: serde::de::DeserializeOwned>(
        &self,
        kind: MessageKind,
    ) -> Result<T, EnvelopeError> {
        serde_json::from_value(self.data.clone())
            .map_err(|source| EnvelopeError::BadPayload { kind, source })
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
