// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery fan-out: one `jobs_discovered` batch becomes many queued
//! collection jobs.

use crate::bridge::{AdminBridge, AdminEvent};
use crate::service::ServiceError;
use fw_core::{
    Area, AreaType, Clock, Command, DiscoveredJob, DiscoveredKind, JobId, NewJob, Provenance,
};
use fw_storage::Store;
use fw_wire::JobsDiscoveredData;
use serde_json::json;
use std::sync::Arc;

/// What a fan-out produced.
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    pub created: Vec<JobId>,
    pub dropped: usize,
    pub creation_errors: usize,
}

/// Converts discovered entities into areas, grants, and queued jobs.
pub struct DiscoveryFanout<C: Clock> {
    store: Arc<Store>,
    bridge: AdminBridge,
    clock: C,
}

impl<C: Clock> DiscoveryFanout<C> {
    pub fn new(store: Arc<Store>, bridge: AdminBridge, clock: C) -> Self {
        Self { store, bridge, clock }
    }

    /// Run the full fan-out for one `jobs_discovered` message.
    ///
    /// Area persistence is all-or-nothing: if it fails, the parent job
    /// is marked failed and nothing is created. Individual job-creation
    /// errors afterwards are counted but do not abort siblings.
    pub fn process(
        &self,
        parent_id: &str,
        data: &JobsDiscoveredData,
    ) -> Result<FanoutOutcome, ServiceError> {
        let parent_id = JobId::from_string(parent_id);
        let now_ms = self.clock.epoch_ms();

        let parent = self
            .store
            .get_job(parent_id.as_str())
            .ok_or(fw_storage::StoreError::JobNotFound(parent_id.to_string()))?;

        // Validate element-wise; malformed entries are dropped, not fatal.
        let valid: Vec<DiscoveredJob> =
            data.discovered_jobs.iter().filter_map(DiscoveredJob::from_value).collect();
        let dropped = data.discovered_jobs.len() - valid.len();
        if dropped > 0 {
            tracing::warn!(parent = %parent_id, dropped, "dropped malformed discovery entries");
        }

        // Persist areas and grants in one transaction; abort on failure.
        let areas: Vec<Area> = valid
            .iter()
            .filter_map(|entry| {
                let kind = match entry.job_type {
                    DiscoveredKind::CrawlGroup => AreaType::Group,
                    DiscoveredKind::CrawlProject => AreaType::Project,
                    _ => return None,
                };
                Some(Area {
                    full_path: entry.namespace_path.clone(),
                    gitlab_id: entry.entity_id.parse().unwrap_or_default(),
                    name: entry.entity_name.clone(),
                    kind,
                    created_at_ms: now_ms,
                })
            })
            .collect();
        if let Err(err) = self.store.upsert_areas(areas, parent.account_id) {
            tracing::error!(parent = %parent_id, error = %err, "area persistence failed, aborting fan-out");
            self.store.mark_failed(
                &parent_id,
                format!("discovery fan-out aborted: {err}"),
                false,
                None,
                now_ms,
            )?;
            return Err(err.into());
        }

        // Create one job per entry plus the per-data-type sub-fan-out.
        let mut outcome = FanoutOutcome { dropped, ..FanoutOutcome::default() };
        for entry in &valid {
            let mut commands = vec![entry.job_type.command()];
            commands.extend(Command::sub_fanout(entry.job_type));

            for command in commands {
                let new = NewJob::new(
                    command,
                    parent.account_id,
                    parent.provider,
                    parent.api_base_url.clone(),
                )
                .full_path(entry.namespace_path.clone())
                .spawned_from(parent_id)
                .provenance(Provenance {
                    discovered_from: parent_id,
                    entity_name: Some(entry.entity_name.clone()),
                    estimated_size: entry.estimated_size,
                    discovery_timestamp_ms: now_ms,
                });
                let new = match &parent.user_id {
                    Some(user) => new.user_id(user.clone()),
                    None => new,
                };
                match self.store.create_job(new, now_ms) {
                    Ok(job) => outcome.created.push(job.id),
                    Err(err) => {
                        outcome.creation_errors += 1;
                        tracing::warn!(
                            parent = %parent_id,
                            command = %command,
                            path = entry.namespace_path,
                            error = %err,
                            "failed to create fan-out job"
                        );
                    }
                }
            }
        }

        // Milestone on the parent: complete, with the spawned ids.
        let spawned_ids: Vec<String> = outcome.created.iter().map(|id| id.to_string()).collect();
        self.store.merge_progress(
            &parent_id,
            json!({
                "overall_completion": 1.0,
                "spawned_job_ids": spawned_ids,
                "discovery_summary": data.discovery_summary,
            }),
            now_ms,
        )?;

        self.nudge_first_jobs(&outcome.created, now_ms);

        tracing::info!(
            parent = %parent_id,
            created = outcome.created.len(),
            dropped,
            groups = data.discovery_summary.total_groups,
            projects = data.discovery_summary.total_projects,
            "discovery fan-out complete"
        );
        self.bridge.publish(AdminEvent::JobsDiscovered {
            job_id: parent_id,
            spawned: outcome.created.len(),
            dropped,
        });
        Ok(outcome)
    }

    /// Best-effort scheduling nudge: reorder the first three created
    /// jobs by command priority (users > groups > projects > other) and
    /// touch them so observers see fresh rows. There is no priority
    /// column; this only orders within the batch.
    fn nudge_first_jobs(&self, created: &[JobId], now_ms: u64) {
        let mut head: Vec<(u8, JobId)> = created
            .iter()
            .take(3)
            .filter_map(|id| {
                let job = self.store.get_job(id.as_str())?;
                let rank = match job.command {
                    Command::FetchUsers => 0,
                    Command::FetchGroups => 1,
                    Command::FetchProjects => 2,
                    _ => 3,
                };
                Some((rank, *id))
            })
            .collect();
        head.sort_by_key(|(rank, _)| *rank);
        for (offset, (_, id)) in head.iter().enumerate() {
            if let Err(err) = self.store.touch_job(id, now_ms + offset as u64) {
                tracing::debug!(job = %id, error = %err, "nudge skipped");
            }
        }
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
