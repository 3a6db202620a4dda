// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repository: transactional reads and writes over jobs, areas,
//! authorizations, and accounts.
//!
//! Every public method is one lock scope: validate against current
//! state, build the event batch, apply, append to the WAL. Nothing is
//! applied unless the whole batch validated, which is what makes a
//! discovery fan-out all-or-nothing and job hand-out exclusive.

use crate::event::StoreEvent;
use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use fw_core::{
    Account, AccountId, Area, AreaType, Command, Job, JobId, JobStatus, NewJob, ResumeState,
    TransitionError,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const WAL_FILE: &str = "fieldwork.wal";
const SNAPSHOT_FILE: &str = "snapshot.json.zst";
const CHECKPOINT_EVERY: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Filter for [`Store::query_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub account_id: Option<AccountId>,
    pub command: Option<Command>,
    pub full_path: Option<String>,
}

impl JobQuery {
    fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.account_id.is_none_or(|a| job.account_id == a)
            && self.command.is_none_or(|c| job.command == c)
            && self
                .full_path
                .as_deref()
                .is_none_or(|p| job.full_path.as_deref() == Some(p))
    }
}

struct Inner {
    state: MaterializedState,
    wal: Wal,
    snapshot_path: PathBuf,
    events_since_checkpoint: usize,
}

/// Durable store shared by every control-plane component.
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    /// Load the snapshot (if any), replay the WAL tail, and open for writes.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(state_dir)?;
        let snapshot_path = state_dir.join(SNAPSHOT_FILE);
        let wal_path = state_dir.join(WAL_FILE);

        let (mut state, snapshot_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (MaterializedState::default(), 0),
        };

        let tail = Wal::replay_after(&wal_path, snapshot_seq)?;
        let replayed = tail.len();
        for entry in &tail {
            state.apply_event(&entry.event);
        }
        let wal = Wal::open(&wal_path)?;
        tracing::info!(jobs = state.jobs.len(), replayed, "store opened");

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                wal,
                snapshot_path,
                events_since_checkpoint: 0,
            }),
        })
    }

    /// Write a snapshot and truncate the WAL.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        checkpoint_inner(&mut inner)
    }

    // --- jobs ---

    pub fn create_job(&self, new: NewJob, now_ms: u64) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let job = Job::create(JobId::new(), new, now_ms);
        commit(&mut inner, vec![StoreEvent::JobCreated { job: job.clone() }])?;
        Ok(job)
    }

    /// Create a batch of jobs in one WAL append.
    pub fn create_jobs(&self, batch: Vec<NewJob>, now_ms: u64) -> Result<Vec<Job>, StoreError> {
        let mut inner = self.inner.lock();
        let jobs: Vec<Job> = batch
            .into_iter()
            .map(|new| Job::create(JobId::new(), new, now_ms))
            .collect();
        let events = jobs
            .iter()
            .map(|job| StoreEvent::JobCreated { job: job.clone() })
            .collect();
        commit(&mut inner, events)?;
        Ok(jobs)
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.inner.lock().state.jobs.get(id).cloned()
    }

    pub fn query_jobs(&self, query: &JobQuery) -> Vec<Job> {
        let inner = self.inner.lock();
        let mut jobs: Vec<Job> =
            inner.state.jobs.values().filter(|j| query.matches(j)).cloned().collect();
        jobs.sort_by_key(|j| (j.created_at_ms, j.id));
        jobs
    }

    /// Transactional select-then-mark hand-out.
    ///
    /// Discovery jobs are excluded from the generic selection and picked
    /// by their own pass ahead of it, so a fresh fan-out is scheduled
    /// before its children. Rows whose account lacks an access token are
    /// skipped. Selected rows are marked `running` under the same lock,
    /// so concurrent polls never receive the same job.
    pub fn take_available(
        &self,
        limit: usize,
        include_failed: bool,
        now_ms: u64,
    ) -> Result<Vec<(Job, Account)>, StoreError> {
        let mut inner = self.inner.lock();

        let eligible = |job: &Job, state: &MaterializedState| -> bool {
            let claimable = job.status == JobStatus::Queued
                || (include_failed && job.status == JobStatus::Failed);
            claimable
                && state
                    .accounts
                    .get(job.account_id.as_str())
                    .is_some_and(Account::has_access_token)
        };

        let mut discovery: Vec<(u64, JobId)> = Vec::new();
        let mut general: Vec<(u64, JobId)> = Vec::new();
        for job in inner.state.jobs.values() {
            if !eligible(job, &inner.state) {
                continue;
            }
            if job.command == Command::GroupProjectDiscovery {
                discovery.push((job.created_at_ms, job.id));
            } else {
                general.push((job.created_at_ms, job.id));
            }
        }
        discovery.sort();
        general.sort();

        let mut picked: Vec<JobId> = discovery.into_iter().map(|(_, id)| id).collect();
        picked.extend(general.into_iter().map(|(_, id)| id));
        picked.truncate(limit);

        let mut events = Vec::new();
        let mut handed_out = Vec::new();
        for id in &picked {
            let Some(job) = inner.state.jobs.get(id.as_str()) else { continue };
            let Some(account) = inner.state.accounts.get(job.account_id.as_str()) else {
                continue;
            };
            let mut claimed = job.clone();
            // Failed rows re-enter the machine through queued.
            if claimed.status == JobStatus::Failed {
                claimed.status = JobStatus::Queued;
                claimed.finished_at_ms = None;
            }
            claimed.transition(JobStatus::Running, now_ms)?;
            events.push(StoreEvent::JobStatusChanged {
                id: *id,
                status: JobStatus::Running,
                at_ms: now_ms,
            });
            handed_out.push((claimed, account.clone()));
        }
        commit(&mut inner, events)?;
        Ok(handed_out)
    }

    /// Merge worker metadata and ensure the row is running.
    ///
    /// Hand-out already marked the row running; a `job_started` for a
    /// row in that state is the normal case and only merges metadata.
    pub fn mark_started(
        &self,
        id: &JobId,
        metadata: Value,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let job = require_job(&inner.state, id)?;
        let mut events = Vec::new();
        match job.status {
            JobStatus::Running => {}
            _ => {
                // Validates queued → running (and rejects terminal rows).
                let mut next = job.clone();
                next.transition(JobStatus::Running, now_ms)?;
                events.push(StoreEvent::JobStatusChanged {
                    id: *id,
                    status: JobStatus::Running,
                    at_ms: now_ms,
                });
            }
        }
        if metadata.as_object().is_some_and(|m| !m.is_empty()) {
            events.push(StoreEvent::JobProgressMerged { id: *id, patch: metadata, at_ms: now_ms });
        }
        commit(&mut inner, events)?;
        Ok(current(&inner.state, id))
    }

    pub fn update_status(
        &self,
        id: &JobId,
        to: JobStatus,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let job = require_job(&inner.state, id)?;
        let mut next = job.clone();
        next.transition(to, now_ms)?;
        commit(
            &mut inner,
            vec![StoreEvent::JobStatusChanged { id: *id, status: to, at_ms: now_ms }],
        )?;
        Ok(current(&inner.state, id))
    }

    pub fn merge_progress(
        &self,
        id: &JobId,
        patch: Value,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        require_job(&inner.state, id)?;
        commit(
            &mut inner,
            vec![StoreEvent::JobProgressMerged { id: *id, patch, at_ms: now_ms }],
        )?;
        Ok(current(&inner.state, id))
    }

    pub fn replace_resume(
        &self,
        id: &JobId,
        resume: Option<ResumeState>,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        require_job(&inner.state, id)?;
        commit(
            &mut inner,
            vec![StoreEvent::JobResumeReplaced { id: *id, resume, at_ms: now_ms }],
        )?;
        Ok(current(&inner.state, id))
    }

    /// Terminal success. A row already terminal is left untouched —
    /// terminal states are never overwritten.
    pub fn mark_completed(
        &self,
        id: &JobId,
        counts: HashMap<String, u64>,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let job = require_job(&inner.state, id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        let mut next = job.clone();
        next.transition(JobStatus::Finished, now_ms)?;
        commit(&mut inner, vec![StoreEvent::JobCompleted { id: *id, counts, at_ms: now_ms }])?;
        Ok(current(&inner.state, id))
    }

    /// Terminal failure; the resume cursor survives iff recoverable.
    pub fn mark_failed(
        &self,
        id: &JobId,
        error: String,
        recoverable: bool,
        resume: Option<ResumeState>,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let job = require_job(&inner.state, id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        let mut next = job.clone();
        next.transition(JobStatus::Failed, now_ms)?;
        commit(
            &mut inner,
            vec![StoreEvent::JobFailed { id: *id, error, recoverable, resume, at_ms: now_ms }],
        )?;
        Ok(current(&inner.state, id))
    }

    pub fn touch_job(&self, id: &JobId, now_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        require_job(&inner.state, id)?;
        commit(&mut inner, vec![StoreEvent::JobTouched { id: *id, at_ms: now_ms }])
    }

    /// Requeue rows a dead crawler left `running`: failed + recoverable,
    /// resume cursor intact, so the next poll can pick them back up.
    pub fn recover_running_jobs(&self, now_ms: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let stuck: Vec<JobId> = inner
            .state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id)
            .collect();
        let events: Vec<StoreEvent> = stuck
            .iter()
            .map(|id| StoreEvent::JobFailed {
                id: *id,
                error: "control plane restarted while job was running".to_string(),
                recoverable: true,
                resume: None,
                at_ms: now_ms,
            })
            .collect();
        let count = events.len();
        commit(&mut inner, events)?;
        Ok(count)
    }

    // --- areas ---

    /// Upsert a batch of areas and grant the account access, as one
    /// all-or-nothing append.
    pub fn upsert_areas(
        &self,
        areas: Vec<Area>,
        account_id: AccountId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.accounts.contains_key(account_id.as_str()) {
            return Err(StoreError::AccountNotFound(account_id.to_string()));
        }
        let mut events = Vec::with_capacity(areas.len() * 2);
        for area in areas {
            let full_path = area.full_path.clone();
            events.push(StoreEvent::AreaUpserted { area });
            events.push(StoreEvent::AreaAuthorized { account_id, area_full_path: full_path });
        }
        commit(&mut inner, events)
    }

    pub fn get_area(&self, full_path: &str) -> Option<Area> {
        self.inner.lock().state.areas.get(full_path).cloned()
    }

    pub fn areas_of_type(&self, kind: AreaType) -> Vec<Area> {
        let inner = self.inner.lock();
        let mut areas: Vec<Area> =
            inner.state.areas.values().filter(|a| a.kind == kind).cloned().collect();
        areas.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        areas
    }

    pub fn is_authorized(&self, account_id: &AccountId, full_path: &str) -> bool {
        let inner = self.inner.lock();
        inner.state.authorizations.iter().any(|auth| {
            auth.account_id == *account_id && auth.area_full_path == full_path
        })
    }

    // --- accounts ---

    pub fn upsert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        commit(&mut inner, vec![StoreEvent::AccountUpserted { account }])
    }

    pub fn get_account(&self, id: &AccountId) -> Option<Account> {
        self.inner.lock().state.accounts.get(id.as_str()).cloned()
    }

    pub fn set_account_tokens(
        &self,
        id: &AccountId,
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.accounts.contains_key(id.as_str()) {
            return Err(StoreError::AccountNotFound(id.to_string()));
        }
        commit(
            &mut inner,
            vec![StoreEvent::AccountTokensUpdated {
                id: *id,
                access_token: Some(access_token),
                refresh_token,
                expires_at_ms,
            }],
        )
    }

    pub fn clear_account_tokens(&self, id: &AccountId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.accounts.contains_key(id.as_str()) {
            return Err(StoreError::AccountNotFound(id.to_string()));
        }
        commit(&mut inner, vec![StoreEvent::AccountTokensCleared { id: *id }])
    }
}

fn require_job(state: &MaterializedState, id: &JobId) -> Result<Job, StoreError> {
    state
        .jobs
        .get(id.as_str())
        .cloned()
        .ok_or_else(|| StoreError::JobNotFound(id.to_string()))
}

fn current(state: &MaterializedState, id: &JobId) -> Job {
    state.jobs.get(id.as_str()).cloned().unwrap_or_else(|| {
        // require_job ran before every commit; reaching here means the
        // row vanished mid-call, which the single lock makes impossible.
        unreachable!("job {id} disappeared under the store lock")
    })
}

/// Apply validated events and append them as one WAL batch.
fn commit(inner: &mut Inner, events: Vec<StoreEvent>) -> Result<(), StoreError> {
    if events.is_empty() {
        return Ok(());
    }
    inner.wal.append_batch(&events)?;
    for event in &events {
        inner.state.apply_event(event);
    }
    inner.events_since_checkpoint += events.len();
    if inner.events_since_checkpoint >= CHECKPOINT_EVERY {
        checkpoint_inner(inner)?;
    }
    Ok(())
}

fn checkpoint_inner(inner: &mut Inner) -> Result<(), StoreError> {
    let seq = inner.wal.write_seq();
    let snapshot = Snapshot::new(seq, inner.state.clone());
    snapshot.save(&inner.snapshot_path)?;
    inner.wal.reset(seq)?;
    inner.events_since_checkpoint = 0;
    tracing::debug!(seq, "checkpoint written");
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
