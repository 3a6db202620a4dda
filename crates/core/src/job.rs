// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job row model and status state machine.
//!
//! Every status change funnels through [`Job::transition`], which is the
//! only place the transition table lives. Callers that need conditional
//! bookkeeping (resume-state retention on failure, metadata merges) do it
//! after a successful transition.

use crate::account::{AccountId, Provider};
use crate::command::Command;
use crate::progress::{Progress, ResumeState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a job row.
    pub struct JobId("job-");
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Finished,
    Failed,
    WaitingCredentialRenewal,
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Running => "running",
        Paused => "paused",
        Finished => "finished",
        Failed => "failed",
        WaitingCredentialRenewal => "waiting_credential_renewal",
    }
}

impl JobStatus {
    /// Whether the transition `self → next` is legal.
    pub fn permits(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Queued, Running)
                | (Queued, Failed)
                | (Running, Paused)
                | (Paused, Queued)
                | (Running, Finished)
                | (Running, Failed)
                | (Running, WaitingCredentialRenewal)
                | (WaitingCredentialRenewal, Running)
                | (WaitingCredentialRenewal, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Where a fanned-out job came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub discovered_from: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<u64>,
    pub discovery_timestamp_ms: u64,
}

/// Inputs for creating a job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub command: Command,
    pub account_id: AccountId,
    pub provider: Provider,
    pub api_base_url: String,
    pub user_id: Option<String>,
    pub full_path: Option<String>,
    pub spawned_from: Option<JobId>,
    pub provenance: Option<Provenance>,
}

impl NewJob {
    pub fn new(command: Command, account_id: AccountId, provider: Provider, api_base_url: impl Into<String>) -> Self {
        Self {
            command,
            account_id,
            provider,
            api_base_url: api_base_url.into(),
            user_id: None,
            full_path: None,
            spawned_from: None,
            provenance: None,
        }
    }

    pub fn full_path(mut self, path: impl Into<String>) -> Self {
        self.full_path = Some(path.into());
        self
    }

    pub fn spawned_from(mut self, parent: JobId) -> Self {
        self.spawned_from = Some(parent);
        self
    }

    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn user_id(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }
}

/// A unit of crawl work, persisted in the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: Command,
    pub account_id: AccountId,
    pub provider: Provider,
    pub api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    pub status: JobStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<ResumeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_from: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl Job {
    pub fn create(id: JobId, new: NewJob, now_ms: u64) -> Self {
        Self {
            id,
            command: new.command,
            account_id: new.account_id,
            provider: new.provider,
            api_base_url: new.api_base_url,
            user_id: new.user_id,
            full_path: new.full_path,
            status: JobStatus::Queued,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
            progress: Progress::default(),
            resume_state: None,
            spawned_from: new.spawned_from,
            provenance: new.provenance,
        }
    }

    /// Apply a status change, with timestamp bookkeeping.
    ///
    /// `running` stamps `started_at`; terminal states stamp `finished_at`;
    /// `finished` clears the resume cursor (a finished job is never
    /// resumed). Terminal states are absorbing: re-entering them or
    /// leaving them is rejected by the transition table.
    pub fn transition(&mut self, to: JobStatus, now_ms: u64) -> Result<(), TransitionError> {
        if !self.status.permits(to) {
            return Err(TransitionError { from: self.status, to });
        }
        self.status = to;
        self.updated_at_ms = now_ms;
        match to {
            JobStatus::Running => {
                if self.started_at_ms.is_none() {
                    self.started_at_ms = Some(now_ms);
                }
            }
            JobStatus::Finished => {
                self.finished_at_ms = Some(now_ms);
                self.resume_state = None;
            }
            JobStatus::Failed => {
                self.finished_at_ms = Some(now_ms);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.updated_at_ms = now_ms;
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
