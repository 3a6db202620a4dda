// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.

use crate::event::StoreEvent;
use fw_core::{Account, Area, AreaAuthorization, AreaType, Job, JobStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// All tables the coordinator reads and writes.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    /// Job rows by id.
    pub jobs: HashMap<String, Job>,
    /// Area rows by `full_path`.
    pub areas: HashMap<String, Area>,
    /// Account → area grants.
    #[serde(default)]
    pub authorizations: HashSet<AreaAuthorization>,
    /// Account rows by id.
    #[serde(default)]
    pub accounts: HashMap<String, Account>,
}

impl MaterializedState {
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Apply an event. Handlers must stay idempotent: the same event may
    /// be applied once when written and again during WAL replay.
    pub fn apply_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::JobCreated { job } => {
                // Guarded insert: replay must not clobber later updates.
                self.jobs.entry(job.id.to_string()).or_insert_with(|| job.clone());
            }

            StoreEvent::JobStatusChanged { id, status, at_ms } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.status = *status;
                    job.updated_at_ms = *at_ms;
                    match status {
                        JobStatus::Running => {
                            if job.started_at_ms.is_none() {
                                job.started_at_ms = Some(*at_ms);
                            }
                            // A failed row re-entering the machine sheds
                            // its stale completion stamp.
                            job.finished_at_ms = None;
                        }
                        JobStatus::Finished => {
                            job.finished_at_ms = Some(*at_ms);
                            job.resume_state = None;
                        }
                        JobStatus::Failed => {
                            job.finished_at_ms = Some(*at_ms);
                        }
                        _ => {}
                    }
                }
            }

            StoreEvent::JobProgressMerged { id, patch, at_ms } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.progress.merge_value(patch);
                    job.progress.last_update_ms = Some(*at_ms);
                    job.updated_at_ms = *at_ms;
                }
            }

            StoreEvent::JobResumeReplaced { id, resume, at_ms } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.resume_state = resume.clone();
                    job.updated_at_ms = *at_ms;
                }
            }

            StoreEvent::JobCompleted { id, counts, at_ms } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.status = JobStatus::Finished;
                    job.finished_at_ms = Some(*at_ms);
                    job.updated_at_ms = *at_ms;
                    job.resume_state = None;
                    for (etype, count) in counts {
                        job.progress.entities.insert(etype.clone(), *count);
                    }
                    job.progress.complete(*at_ms);
                }
            }

            StoreEvent::JobFailed { id, error, recoverable, resume, at_ms } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.status = JobStatus::Failed;
                    job.finished_at_ms = Some(*at_ms);
                    job.updated_at_ms = *at_ms;
                    job.progress.message = Some(error.clone());
                    job.resume_state = if *recoverable {
                        resume.clone().or_else(|| job.resume_state.clone())
                    } else {
                        None
                    };
                }
            }

            StoreEvent::JobTouched { id, at_ms } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.updated_at_ms = *at_ms;
                }
            }

            StoreEvent::AreaUpserted { area } => {
                match self.areas.get_mut(&area.full_path) {
                    Some(existing) => {
                        existing.gitlab_id = area.gitlab_id;
                        existing.name = area.name.clone();
                        // A project never reverts to a group.
                        if existing.kind != AreaType::Project {
                            existing.kind = area.kind;
                        }
                    }
                    None => {
                        self.areas.insert(area.full_path.clone(), area.clone());
                    }
                }
            }

            StoreEvent::AreaAuthorized { account_id, area_full_path } => {
                self.authorizations.insert(AreaAuthorization {
                    account_id: *account_id,
                    area_full_path: area_full_path.clone(),
                });
            }

            StoreEvent::AccountUpserted { account } => {
                self.accounts.insert(account.id.to_string(), account.clone());
            }

            StoreEvent::AccountTokensUpdated { id, access_token, refresh_token, expires_at_ms } => {
                if let Some(account) = self.accounts.get_mut(id.as_str()) {
                    account.access_token = access_token.clone();
                    if refresh_token.is_some() {
                        account.refresh_token = refresh_token.clone();
                    }
                    account.token_expires_at_ms = *expires_at_ms;
                }
            }

            StoreEvent::AccountTokensCleared { id } => {
                if let Some(account) = self.accounts.get_mut(id.as_str()) {
                    account.clear_tokens();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
