// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task processor: executes received jobs against the GitLab API.
//!
//! Runs up to `max_active_jobs` jobs concurrently. Each job emits
//! `job_started`, throttled `job_progress`, and exactly one terminal
//! `job_completed` or `job_failed`.

use crate::anonymize::Anonymizer;
use crate::artifacts::ArtifactStore;
use crate::client::ClientHandle;
use crate::config::CrawlerConfig;
use crate::error::CrawlError;
use crate::http::GitLabFetch;
use crate::limits::RateLimiter;
use crate::paginate::Paginator;
use crate::task::CrawlTask;
use fw_core::{Command, DiscoveredKind, ResumeState};
use fw_wire::{
    JobCompletedData, JobDescriptor, JobFailedData, JobProgressData, JobsDiscoveredData, Stage,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
const JUST_FETCHED_SAMPLE: usize = 3;

/// Why a job ended in `job_failed`.
struct TaskFailure {
    error: CrawlError,
    resume: Option<ResumeState>,
    partial: HashMap<String, u64>,
}

impl TaskFailure {
    fn plain(error: CrawlError) -> Self {
        Self { error, resume: None, partial: HashMap::new() }
    }
}

/// Rate-limits progress emission to one message per window, but never
/// swallows the first.
struct ProgressThrottle {
    last: Option<tokio::time::Instant>,
}

impl ProgressThrottle {
    fn new() -> Self {
        Self { last: None }
    }

    fn ready(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < PROGRESS_INTERVAL => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Executes jobs pulled off the descriptor channel.
pub struct TaskProcessor {
    config: CrawlerConfig,
    fetch: Arc<dyn GitLabFetch>,
    artifacts: ArtifactStore,
    anonymizer: Arc<Anonymizer>,
    handle: ClientHandle,
    limiter: Mutex<RateLimiter>,
}

impl TaskProcessor {
    pub fn new(
        config: CrawlerConfig,
        fetch: Arc<dyn GitLabFetch>,
        artifacts: ArtifactStore,
        anonymizer: Arc<Anonymizer>,
        handle: ClientHandle,
    ) -> Self {
        let limiter =
            Mutex::new(RateLimiter::new(config.max_requests_per_minute, config.max_requests_per_hour));
        Self { config, fetch, artifacts, anonymizer, handle, limiter }
    }

    /// Pull jobs until the channel closes or shutdown is requested.
    pub async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::UnboundedReceiver<JobDescriptor>,
        cancel: CancellationToken,
    ) {
        let slots = Arc::new(Semaphore::new(self.config.max_active_jobs));
        loop {
            let descriptor = tokio::select! {
                _ = cancel.cancelled() => break,
                received = jobs.recv() => match received {
                    Some(descriptor) => descriptor,
                    None => break,
                },
            };
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else { break };
            let processor = Arc::clone(&self);
            tokio::spawn(async move {
                processor.process(descriptor).await;
                drop(permit);
            });
        }
    }

    /// Run one job start-to-terminal.
    pub async fn process(&self, descriptor: JobDescriptor) {
        let mut task = CrawlTask::from_descriptor(descriptor);
        tracing::info!(job = task.id, command = %task.command, "job started");
        self.handle.job_slot_taken();
        self.handle.emit_job_started(&task.id);

        match self.execute(&mut task).await {
            Ok(counts) => {
                let processed: u64 = counts.values().sum();
                self.handle.emit_job_completed(
                    &task.id,
                    &JobCompletedData {
                        success: true,
                        final_counts: counts,
                        message: None,
                        output_files: None,
                    },
                );
                self.handle.job_slot_released(processed);
                tracing::info!(job = task.id, processed, "job completed");
            }
            Err(failure) => {
                self.handle.emit_job_failed(
                    &task.id,
                    &JobFailedData {
                        error: failure.error.to_string(),
                        error_type: Some(failure.error.error_type().to_string()),
                        is_recoverable: failure.error.is_recoverable(),
                        resume_state: failure.resume.clone(),
                        partial_counts: (!failure.partial.is_empty())
                            .then(|| failure.partial.clone()),
                    },
                );
                self.handle.job_slot_released(0);
                tracing::warn!(job = task.id, error = %failure.error, "job failed");
            }
        }
    }

    async fn execute(&self, task: &mut CrawlTask) -> Result<HashMap<String, u64>, TaskFailure> {
        match task.command {
            Command::TestType => self.run_stub(task),
            Command::GroupProjectDiscovery => self.run_discovery(task).await,
            _ => self.run_collection(task).await,
        }
    }

    /// `TEST_TYPE` stores a fixed record; used by connectivity checks.
    fn run_stub(&self, task: &CrawlTask) -> Result<HashMap<String, u64>, TaskFailure> {
        let record = json!({ "test": true, "job_id": task.id });
        self.artifacts
            .store_items(&task.storage_key(), "test", &[record])
            .map_err(TaskFailure::plain)?;
        Ok([("test".to_string(), 1u64)].into_iter().collect())
    }

    /// The generic collection algorithm: resolve endpoints, paginate,
    /// anonymize, persist, report.
    async fn run_collection(
        &self,
        task: &mut CrawlTask,
    ) -> Result<HashMap<String, u64>, TaskFailure> {
        let entity_type = task.command.entity_type().to_string();
        let templates = task.command.endpoint_templates();

        // Resolve every template first; a missing parameter makes the
        // whole job a designed no-op, not an error.
        let mut resolved = Vec::new();
        let mut missing = Vec::new();
        for template in templates {
            match task.resolve_endpoint(template) {
                Ok(url) => resolved.push(url),
                Err(params) => missing.extend(params),
            }
        }
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            self.handle.emit_job_progress(
                &task.id,
                &JobProgressData {
                    stage: Stage::Completed,
                    entity_type: Some(entity_type.clone()),
                    processed: 0,
                    total: None,
                    message: Some(format!("missing parameters: {}", missing.join(", "))),
                    resume_state: None,
                    just_fetched: None,
                },
            );
            return Ok([(entity_type, 0u64)].into_iter().collect());
        }

        let multi_endpoint = resolved.len() > 1;
        let mut throttle = ProgressThrottle::new();
        let mut items: Vec<Value> = Vec::new();

        for url in &resolved {
            let start_page = task.resume.as_ref().and_then(|r| r.current_page).unwrap_or(1);
            let mut pager = Paginator::new(self.fetch.as_ref(), url.clone(), task.access_token.clone())
                .per_page(self.config.per_page)
                .starting_page(start_page)
                .repair_json(self.config.repair_json);
            // The cursor only applies to the endpoint it was taken from.
            task.resume = None;

            let mut renewed = false;
            loop {
                self.respect_rate_budget(task, &entity_type).await;
                let page = match pager.next_page().await {
                    Ok(Some(page)) => page,
                    Ok(None) => break,
                    Err(CrawlError::Http { status: 401, .. }) if !renewed => {
                        renewed = true;
                        let token = self.renew_token(task).await.map_err(|error| TaskFailure {
                            error,
                            resume: Some(resume_at(&entity_type, pager.current_page())),
                            partial: count_map(&entity_type, items.len()),
                        })?;
                        pager.set_token(&token);
                        task.access_token = token;
                        continue;
                    }
                    Err(CrawlError::Http { status: 404, .. }) if multi_endpoint => {
                        // The other scope of a dual-scope resource; no data here.
                        tracing::debug!(job = task.id, url, "404 on secondary endpoint scope");
                        break;
                    }
                    Err(error) => {
                        return Err(TaskFailure {
                            error,
                            resume: Some(resume_at(&entity_type, pager.current_page())),
                            partial: count_map(&entity_type, items.len()),
                        });
                    }
                };

                for mut item in page {
                    self.anonymizer.scrub(&mut item);
                    items.push(item);
                }
                if throttle.ready() {
                    let sample: Vec<Value> =
                        items.iter().rev().take(JUST_FETCHED_SAMPLE).cloned().collect();
                    self.handle.emit_job_progress(
                        &task.id,
                        &JobProgressData {
                            stage: Stage::Fetching,
                            entity_type: Some(entity_type.clone()),
                            processed: items.len() as u64,
                            total: None,
                            message: Some(format!("page {}", pager.current_page() - 1)),
                            resume_state: Some(resume_at(&entity_type, pager.current_page())),
                            just_fetched: Some(sample),
                        },
                    );
                }
            }
        }

        self.artifacts
            .store_items(&task.storage_key(), &entity_type, &items)
            .map_err(|error| TaskFailure {
                error,
                resume: None,
                partial: count_map(&entity_type, items.len()),
            })?;
        Ok(count_map(&entity_type, items.len()))
    }

    /// `GROUP_PROJECT_DISCOVERY`: enumerate groups and projects, persist
    /// the area list, and emit one `jobs_discovered`.
    async fn run_discovery(
        &self,
        task: &mut CrawlTask,
    ) -> Result<HashMap<String, u64>, TaskFailure> {
        let mut throttle = ProgressThrottle::new();

        let groups = self
            .collect_endpoint(task, &format!("{}/api/v4/groups", task.api_base), "groups")
            .await?;
        self.emit_discovery_progress(task, &mut throttle, "groups", groups.len());

        // Per-group project listings, then the global listing, deduped.
        let mut projects: Vec<Value> = Vec::new();
        let mut seen_project_ids = std::collections::HashSet::new();
        for group in &groups {
            let Some(group_id) = group.get("id").and_then(Value::as_i64) else { continue };
            let url = format!("{}/api/v4/groups/{}/projects", task.api_base, group_id);
            for project in self.collect_endpoint(task, &url, "projects").await? {
                if let Some(id) = project.get("id").and_then(Value::as_i64) {
                    if seen_project_ids.insert(id) {
                        projects.push(project);
                    }
                }
            }
        }
        let url = format!("{}/api/v4/projects", task.api_base);
        for project in self.collect_endpoint(task, &url, "projects").await? {
            if let Some(id) = project.get("id").and_then(Value::as_i64) {
                if seen_project_ids.insert(id) {
                    projects.push(project);
                }
            }
        }
        self.emit_discovery_progress(task, &mut throttle, "projects", projects.len());

        // Shape areas and discovery entries, dropping incomplete rows.
        let mut areas = Vec::new();
        let mut discovered = Vec::new();
        let mut total_groups = 0u64;
        for group in &groups {
            let Some(entry) = discovery_entry(group, DiscoveredKind::CrawlGroup) else { continue };
            total_groups += 1;
            areas.push(entry.0);
            discovered.push(entry.1);
        }
        let mut total_projects = 0u64;
        for project in &projects {
            let Some(entry) = discovery_entry(project, DiscoveredKind::CrawlProject) else {
                continue;
            };
            total_projects += 1;
            areas.push(entry.0);
            discovered.push(entry.1);
        }

        self.artifacts
            .store_items("areas", "areas", &areas)
            .map_err(TaskFailure::plain)?;

        self.handle.emit_jobs_discovered(
            &task.id,
            &JobsDiscoveredData {
                discovered_jobs: discovered,
                discovery_summary: fw_core::DiscoverySummary { total_groups, total_projects },
            },
        );

        Ok([
            ("groups".to_string(), total_groups),
            ("projects".to_string(), total_projects),
        ]
        .into_iter()
        .collect())
    }

    /// Paginate one discovery endpoint to exhaustion, with the same 401
    /// renewal path as collection.
    async fn collect_endpoint(
        &self,
        task: &mut CrawlTask,
        url: &str,
        entity_type: &str,
    ) -> Result<Vec<Value>, TaskFailure> {
        let mut pager = Paginator::new(self.fetch.as_ref(), url, task.access_token.clone())
            .per_page(self.config.per_page);
        let mut items = Vec::new();
        let mut renewed = false;
        loop {
            self.respect_rate_budget(task, entity_type).await;
            match pager.next_page().await {
                Ok(Some(page)) => items.extend(page),
                Ok(None) => return Ok(items),
                Err(CrawlError::Http { status: 401, .. }) if !renewed => {
                    renewed = true;
                    let token = self.renew_token(task).await.map_err(|error| TaskFailure {
                        error,
                        resume: Some(resume_at(entity_type, pager.current_page())),
                        partial: HashMap::new(),
                    })?;
                    pager.set_token(&token);
                    task.access_token = token;
                }
                Err(error) => {
                    return Err(TaskFailure {
                        error,
                        resume: Some(resume_at(entity_type, pager.current_page())),
                        partial: HashMap::new(),
                    });
                }
            }
        }
    }

    /// Ask the control plane for a new token; error means the job is
    /// over (RefreshFailed is not recoverable).
    async fn renew_token(&self, task: &CrawlTask) -> Result<String, CrawlError> {
        tracing::info!(job = task.id, "401 received, requesting token refresh");
        let response = self
            .handle
            .request_token_refresh(&task.id)
            .await
            .ok_or(CrawlError::RefreshFailed)?;
        match (response.refresh_successful, response.access_token) {
            (true, Some(token)) if !token.is_empty() => Ok(token),
            _ => Err(CrawlError::RefreshFailed),
        }
    }

    /// Sleep out exhausted request budgets, emitting a timeout progress
    /// event so the control plane sees why nothing is moving.
    async fn respect_rate_budget(&self, task: &CrawlTask, entity_type: &str) {
        loop {
            let now_ms = fw_core::Clock::epoch_ms(&fw_core::SystemClock);
            let wait = match self.limiter.lock().acquire(now_ms) {
                Ok(()) => return,
                Err(wait) => wait,
            };
            tracing::info!(job = task.id, wait_ms = wait.as_millis() as u64, "request budget exhausted");
            self.handle.emit_job_progress(
                &task.id,
                &JobProgressData {
                    stage: Stage::Fetching,
                    entity_type: Some(entity_type.to_string()),
                    processed: 0,
                    total: None,
                    message: Some(format!(
                        "request budget exhausted, waiting {}s",
                        wait.as_secs().max(1)
                    )),
                    resume_state: None,
                    just_fetched: None,
                },
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn emit_discovery_progress(
        &self,
        task: &CrawlTask,
        throttle: &mut ProgressThrottle,
        entity_type: &str,
        count: usize,
    ) {
        if throttle.ready() {
            self.handle.emit_job_progress(
                &task.id,
                &JobProgressData {
                    stage: Stage::Discovering,
                    entity_type: Some(entity_type.to_string()),
                    processed: count as u64,
                    total: None,
                    message: None,
                    resume_state: None,
                    just_fetched: None,
                },
            );
        }
    }
}

fn resume_at(entity_type: &str, page: u32) -> ResumeState {
    ResumeState {
        current_page: Some(page),
        last_entity_id: None,
        entity_type: Some(entity_type.to_string()),
    }
}

fn count_map(entity_type: &str, count: usize) -> HashMap<String, u64> {
    [(entity_type.to_string(), count as u64)].into_iter().collect()
}

/// Build the area record and discovery entry for one REST row; `None`
/// when id, name, or path is missing.
fn discovery_entry(row: &Value, kind: DiscoveredKind) -> Option<(Value, Value)> {
    let id = row.get("id").and_then(Value::as_i64)?;
    let name = row.get("name").and_then(Value::as_str)?;
    let path = match kind {
        DiscoveredKind::CrawlGroup => row.get("full_path").and_then(Value::as_str)?,
        _ => row.get("path_with_namespace").and_then(Value::as_str)?,
    };
    if name.is_empty() || path.is_empty() {
        return None;
    }
    let area_type = if kind == DiscoveredKind::CrawlGroup { "group" } else { "project" };
    let area = json!({ "id": id, "name": name, "full_path": path, "type": area_type });
    let entry = json!({
        "job_type": kind.to_string(),
        "entity_id": id,
        "namespace_path": path,
        "entity_name": name,
    });
    Some((area, entry))
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
