// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job service: the bridge between the router and the repository.
//!
//! All transition decisions route through here so handlers never touch
//! job rows directly. Progress fan-out to admin observers is throttled
//! per job.

use crate::bridge::{AdminBridge, AdminEvent};
use crate::config::ControlConfig;
use fw_core::{Clock, JobId, JobStatus};
use fw_storage::{Store, StoreError};
use fw_wire::{
    JobCompletedData, JobDescriptor, JobFailedData, JobProgressData, Stage,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Admin progress events: at most one per job per this window.
const PROGRESS_EMIT_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coordinates job hand-out and lifecycle updates.
pub struct JobService<C: Clock> {
    store: Arc<Store>,
    bridge: AdminBridge,
    clock: C,
    send_failed_to_worker: bool,
    max_jobs_per_request: usize,
    progress_emits: Mutex<HashMap<JobId, u64>>,
}

impl<C: Clock> JobService<C> {
    pub fn new(store: Arc<Store>, bridge: AdminBridge, config: &ControlConfig, clock: C) -> Self {
        Self {
            store,
            bridge,
            clock,
            send_failed_to_worker: config.send_failed_to_worker,
            max_jobs_per_request: config.max_jobs_per_request,
            progress_emits: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Claim up to `requested` queued jobs and shape them for the wire.
    ///
    /// Claimed rows are already `running` (select-then-mark), so a
    /// concurrent poll can never receive the same job.
    pub fn get_available(&self, requested: Option<u32>) -> Result<Vec<JobDescriptor>, ServiceError> {
        let limit = (requested.unwrap_or(1) as usize).min(self.max_jobs_per_request);
        let now_ms = self.clock.epoch_ms();
        let claimed = self.store.take_available(limit, self.send_failed_to_worker, now_ms)?;

        let mut descriptors = Vec::with_capacity(claimed.len());
        for (job, account) in claimed {
            let Some(access_token) = account.access_token.clone() else { continue };
            let entity_id = job
                .full_path
                .as_deref()
                .and_then(|path| self.store.get_area(path))
                .map(|area| area.gitlab_id.to_string());
            descriptors.push(JobDescriptor {
                id: job.id.to_string(),
                entity_type: job.command,
                entity_id,
                full_path: job.full_path.clone(),
                gitlab_url: job.api_base_url.clone(),
                access_token,
                resume_state: job.resume_state.clone(),
                options: Map::new(),
            });
        }
        tracing::debug!(handed_out = descriptors.len(), "job hand-out");
        Ok(descriptors)
    }

    /// `job_started`: ensure the row is running and merge metadata.
    pub fn mark_started(
        &self,
        job_id: &str,
        connection_id: u64,
        metadata: Map<String, Value>,
    ) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        let now_ms = self.clock.epoch_ms();
        self.store.mark_started(&id, Value::Object(metadata), now_ms)?;
        tracing::info!(job = %id, connection = connection_id, "job started");
        self.bridge.publish(AdminEvent::JobStarted { job_id: id, connection_id });
        Ok(())
    }

    /// `job_progress`: merge counters, replace the resume cursor when
    /// present, and emit a throttled admin event.
    pub fn update_progress(
        &self,
        job_id: &str,
        data: JobProgressData,
        connection_id: u64,
    ) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        let now_ms = self.clock.epoch_ms();

        let mut patch = Map::new();
        if let Some(entity_type) = &data.entity_type {
            let mut entities = Map::new();
            entities.insert(entity_type.clone(), json!(data.processed));
            patch.insert("entities".into(), Value::Object(entities));
            if let Some(total) = data.total {
                if total > 0 {
                    let fraction = (data.processed as f64 / total as f64).clamp(0.0, 1.0);
                    patch.insert("overall_completion".into(), json!(fraction));
                }
            }
        }
        if data.stage == Stage::Completed {
            patch.insert("overall_completion".into(), json!(1.0));
        }
        if let Some(message) = &data.message {
            patch.insert("message".into(), json!(message));
        }
        patch.insert("stage".into(), json!(data.stage.to_string()));

        if data.resume_state.is_some() {
            self.store.replace_resume(&id, data.resume_state.clone(), now_ms)?;
        }
        let job = self.store.merge_progress(&id, Value::Object(patch), now_ms)?;
        tracing::debug!(job = %id, connection = connection_id, stage = %data.stage, "progress");

        let should_emit = {
            let mut emits = self.progress_emits.lock();
            let last = emits.get(&id).copied().unwrap_or(0);
            if now_ms.saturating_sub(last) >= PROGRESS_EMIT_INTERVAL_MS || last == 0 {
                emits.insert(id, now_ms);
                true
            } else {
                false
            }
        };
        if should_emit {
            self.bridge.publish(AdminEvent::JobProgress {
                job_id: id,
                overall_completion: job.progress.overall_completion,
            });
        }
        Ok(())
    }

    /// `job_completed`: terminal success, resume cursor cleared.
    pub fn mark_completed(&self, job_id: &str, data: JobCompletedData) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        let now_ms = self.clock.epoch_ms();
        self.store.mark_completed(&id, data.final_counts, now_ms)?;
        self.progress_emits.lock().remove(&id);
        tracing::info!(job = %id, success = data.success, "job completed");
        self.bridge.publish(AdminEvent::JobCompleted { job_id: id, success: data.success });
        Ok(())
    }

    /// `job_failed`: terminal failure; cursor survives iff recoverable.
    pub fn mark_failed(&self, job_id: &str, data: JobFailedData) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        let now_ms = self.clock.epoch_ms();
        self.store.mark_failed(
            &id,
            data.error.clone(),
            data.is_recoverable,
            data.resume_state.clone(),
            now_ms,
        )?;
        self.progress_emits.lock().remove(&id);
        tracing::warn!(job = %id, recoverable = data.is_recoverable, error = %data.error, "job failed");
        self.bridge.publish(AdminEvent::JobFailed { job_id: id, recoverable: data.is_recoverable });
        Ok(())
    }

    /// Operator pause: running → paused.
    pub fn pause(&self, job_id: &str) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        self.store.update_status(&id, JobStatus::Paused, self.clock.epoch_ms())?;
        Ok(())
    }

    /// Operator resume: paused → queued, picked up by the next poll.
    pub fn resume(&self, job_id: &str) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        self.store.update_status(&id, JobStatus::Queued, self.clock.epoch_ms())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
