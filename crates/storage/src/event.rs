// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store events: facts about job, area, and account rows.
//!
//! Events are validated before they are appended, so `apply_event` is
//! infallible and idempotent — replaying the same WAL twice produces
//! the same state.

use fw_core::{Account, AccountId, Area, Job, JobId, JobStatus, ResumeState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A durable state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    #[serde(rename = "job:created")]
    JobCreated { job: Job },

    #[serde(rename = "job:status")]
    JobStatusChanged { id: JobId, status: JobStatus, at_ms: u64 },

    #[serde(rename = "job:progress")]
    JobProgressMerged { id: JobId, patch: Value, at_ms: u64 },

    #[serde(rename = "job:resume")]
    JobResumeReplaced {
        id: JobId,
        #[serde(default)]
        resume: Option<ResumeState>,
        at_ms: u64,
    },

    #[serde(rename = "job:completed")]
    JobCompleted {
        id: JobId,
        #[serde(default)]
        counts: HashMap<String, u64>,
        at_ms: u64,
    },

    #[serde(rename = "job:failed")]
    JobFailed {
        id: JobId,
        error: String,
        recoverable: bool,
        #[serde(default)]
        resume: Option<ResumeState>,
        at_ms: u64,
    },

    #[serde(rename = "job:touched")]
    JobTouched { id: JobId, at_ms: u64 },

    #[serde(rename = "area:upserted")]
    AreaUpserted { area: Area },

    #[serde(rename = "area:authorized")]
    AreaAuthorized { account_id: AccountId, area_full_path: String },

    #[serde(rename = "account:upserted")]
    AccountUpserted { account: Account },

    #[serde(rename = "account:tokens")]
    AccountTokensUpdated {
        id: AccountId,
        #[serde(default)]
        access_token: Option<String>,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at_ms: Option<u64>,
    },

    #[serde(rename = "account:tokens_cleared")]
    AccountTokensCleared { id: AccountId },
}
