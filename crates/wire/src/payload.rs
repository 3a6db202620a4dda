// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed `data` payloads per message type.
//!
//! Worker-protocol payloads use camelCase keys; discovery payloads keep
//! the snake_case spelling of the REST entities they carry.

use fw_core::{Command, DiscoverySummary, ResumeState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Crawler health as reported in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Idle,
    Discovering,
    Processing,
    Error,
}

fw_core::simple_display! {
    SystemStatus {
        Idle => "idle",
        Discovering => "discovering",
        Processing => "processing",
        Error => "error",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatData {
    pub active_jobs: u32,
    pub total_processed: u64,
    pub system_status: SystemStatus,
}

/// `job_request` carries no required fields; `maxJobs` hints how many
/// descriptors the crawler can take.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_jobs: Option<u32>,
}

/// One job handed to a crawler in a `job_response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub id: String,
    /// The crawl command; named `entityType` on the wire.
    pub entity_type: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    pub gitlab_url: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<ResumeState>,
    /// Extra path parameters (`pipeline_id`, `issue_iid`, …).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResponseData {
    pub jobs: Vec<JobDescriptor>,
}

/// `job_started` carries free-form metadata merged into the job's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStartedData {
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Stage of a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovering,
    Fetching,
    Completed,
    Failed,
}

fw_core::simple_display! {
    Stage {
        Discovering => "discovering",
        Fetching => "fetching",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressData {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    pub processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<ResumeState>,
    /// Sample of the most recently fetched items, for observers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub just_fetched: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletedData {
    pub success: bool,
    #[serde(default)]
    pub final_counts: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_files: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailedData {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub is_recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<ResumeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_counts: Option<HashMap<String, u64>>,
}

/// `jobs_discovered`: entries stay raw so one malformed element is
/// dropped during fan-out instead of rejecting the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobsDiscoveredData {
    #[serde(default)]
    pub discovered_jobs: Vec<Value>,
    #[serde(default)]
    pub discovery_summary: DiscoverySummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenRefreshRequestData {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub refresh_successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
