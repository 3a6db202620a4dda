// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::anonymize::LookupTable;
use crate::client::SocketClient;
use crate::http::HttpResponse;
use async_trait::async_trait;
use fw_wire::{Envelope, MessageKind};
use serde_json::json;
use tempfile::TempDir;

/// Maps URL prefixes to canned bodies; unknown URLs 404.
struct RouteFetch {
    routes: Vec<(String, Vec<serde_json::Value>)>,
    unauthorized_first: Mutex<bool>,
}

impl RouteFetch {
    fn new(routes: Vec<(&str, serde_json::Value)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(url, body)| (url.to_string(), vec![body]))
                .collect(),
            unauthorized_first: Mutex::new(false),
        }
    }

    fn with_401_first(self) -> Self {
        *self.unauthorized_first.lock() = true;
        self
    }
}

#[async_trait]
impl GitLabFetch for RouteFetch {
    async fn get(&self, url: &str, token: &str) -> Result<HttpResponse, CrawlError> {
        if *self.unauthorized_first.lock() && token == "T1" {
            return Ok(HttpResponse {
                status: 401,
                status_text: "Unauthorized".into(),
                retry_after_secs: None,
                body: String::new(),
            });
        }
        let path = url.split('?').next().unwrap_or(url);
        for (route, bodies) in &self.routes {
            if path == route {
                return Ok(HttpResponse {
                    status: 200,
                    status_text: "OK".into(),
                    retry_after_secs: None,
                    body: bodies[0].to_string(),
                });
            }
        }
        Ok(HttpResponse {
            status: 404,
            status_text: "Not Found".into(),
            retry_after_secs: None,
            body: "{}".into(),
        })
    }
}

struct Fixture {
    _dir: TempDir,
    processor: TaskProcessor,
    handle: ClientHandle,
    artifacts: ArtifactStore,
}

fn fixture(fetch: RouteFetch, tweak: impl FnOnce(&mut CrawlerConfig)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = CrawlerConfig {
        socket_path: dir.path().join("absent.sock"),
        data_dir: dir.path().join("data"),
        token_refresh_timeout_ms: 50,
        ..CrawlerConfig::default()
    };
    tweak(&mut config);
    let (client, _jobs) = SocketClient::new(config.clone());
    let handle = client.handle();
    let artifacts = ArtifactStore::new(&config.data_dir);
    let anonymizer = Arc::new(Anonymizer::new("secret", LookupTable::new(None, false)));
    let processor = TaskProcessor::new(
        config,
        Arc::new(fetch),
        artifacts.clone(),
        anonymizer,
        handle.clone(),
    );
    Fixture { _dir: dir, processor, handle, artifacts }
}

fn descriptor(command: Command, full_path: Option<&str>, entity_id: Option<&str>) -> JobDescriptor {
    JobDescriptor {
        id: "job-1".into(),
        entity_type: command,
        entity_id: entity_id.map(String::from),
        full_path: full_path.map(String::from),
        gitlab_url: "https://gitlab.example.com".into(),
        access_token: "T1".into(),
        resume_state: None,
        options: serde_json::Map::new(),
    }
}

fn kinds(envelopes: &[Envelope]) -> Vec<MessageKind> {
    envelopes.iter().filter_map(Envelope::message_kind).collect()
}

#[tokio::test]
async fn fetch_issues_collects_anonymizes_and_persists() {
    let fx = fixture(
        RouteFetch::new(vec![(
            "https://gitlab.example.com/api/v4/projects/101/issues",
            json!([{ "id": 1, "author_name": "Ada" }, { "id": 2, "author_name": "Grace" }]),
        )]),
        |_| {},
    );

    fx.processor.process(descriptor(Command::FetchIssues, Some("g/p"), Some("101"))).await;

    let envelopes = fx.handle.take_queued();
    let kinds = kinds(&envelopes);
    assert_eq!(kinds.first(), Some(&MessageKind::JobStarted));
    assert_eq!(kinds.last(), Some(&MessageKind::JobCompleted));
    let completed = envelopes.last().unwrap();
    assert_eq!(completed.data["success"], json!(true));
    assert_eq!(completed.data["finalCounts"]["issues"], json!(2));

    let stored = fx.artifacts.load_items("g/p", "issues").unwrap();
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0]["author_name"], json!("Ada"));
}

#[tokio::test]
async fn missing_parameters_complete_with_zero_and_no_http() {
    let fx = fixture(RouteFetch::new(vec![]), |_| {});

    fx.processor.process(descriptor(Command::FetchIssues, None, None)).await;

    let envelopes = fx.handle.take_queued();
    let kinds = kinds(&envelopes);
    assert_eq!(
        kinds,
        vec![MessageKind::JobStarted, MessageKind::JobProgress, MessageKind::JobCompleted]
    );

    let progress = &envelopes[1];
    assert_eq!(progress.data["stage"], json!("completed"));
    assert_eq!(progress.data["processed"], json!(0));
    assert!(progress.data["message"].as_str().unwrap().starts_with("missing parameters:"));

    let completed = &envelopes[2];
    assert_eq!(completed.data["success"], json!(true));
    assert_eq!(completed.data["finalCounts"]["issues"], json!(0));
}

#[tokio::test]
async fn http_500_fails_recoverably_with_resume_state() {
    // No matching route: every request 404s; single-endpoint command
    // treats that as a plain HTTP failure.
    struct FailFetch;
    #[async_trait]
    impl GitLabFetch for FailFetch {
        async fn get(&self, _url: &str, _token: &str) -> Result<HttpResponse, CrawlError> {
            Ok(HttpResponse {
                status: 500,
                status_text: "Internal Server Error".into(),
                retry_after_secs: None,
                body: String::new(),
            })
        }
    }

    let dir = TempDir::new().unwrap();
    let config = CrawlerConfig {
        socket_path: dir.path().join("absent.sock"),
        data_dir: dir.path().join("data"),
        ..CrawlerConfig::default()
    };
    let (client, _jobs) = SocketClient::new(config.clone());
    let handle = client.handle();
    let processor = TaskProcessor::new(
        config.clone(),
        Arc::new(FailFetch),
        ArtifactStore::new(&config.data_dir),
        Arc::new(Anonymizer::new("secret", LookupTable::new(None, false))),
        handle.clone(),
    );

    processor.process(descriptor(Command::FetchIssues, Some("g/p"), Some("101"))).await;

    let envelopes = handle.take_queued();
    let failed = envelopes.last().unwrap();
    assert_eq!(failed.message_kind(), Some(MessageKind::JobFailed));
    assert_eq!(failed.data["isRecoverable"], json!(true));
    assert_eq!(failed.data["errorType"], json!("http"));
    assert_eq!(failed.data["resumeState"]["current_page"], json!(1));
}

#[tokio::test]
async fn refresh_timeout_fails_the_job_unrecoverably() {
    // 401 forever; nobody answers the refresh request.
    let fetch = RouteFetch::new(vec![]).with_401_first();
    let fx = fixture(fetch, |c| c.token_refresh_timeout_ms = 30);

    fx.processor.process(descriptor(Command::FetchIssues, Some("g/p"), Some("101"))).await;

    let envelopes = fx.handle.take_queued();
    let failed = envelopes.last().unwrap();
    assert_eq!(failed.message_kind(), Some(MessageKind::JobFailed));
    assert_eq!(failed.data["isRecoverable"], json!(false));
    assert_eq!(failed.data["errorType"], json!("auth"));
    // The refresh request itself went out before the failure.
    assert!(kinds(&envelopes).contains(&MessageKind::TokenRefreshRequest));
}

#[tokio::test]
async fn test_type_stores_stub_record() {
    let fx = fixture(RouteFetch::new(vec![]), |_| {});

    fx.processor.process(descriptor(Command::TestType, None, None)).await;

    let envelopes = fx.handle.take_queued();
    assert_eq!(envelopes.last().unwrap().data["finalCounts"]["test"], json!(1));
    let stored = fx.artifacts.load_items("test", "test").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["test"], json!(true));
}

#[tokio::test]
async fn discovery_emits_jobs_discovered_with_summary() {
    let fx = fixture(
        RouteFetch::new(vec![
            (
                "https://gitlab.example.com/api/v4/groups",
                json!([{ "id": 1, "name": "g", "full_path": "g" }]),
            ),
            (
                "https://gitlab.example.com/api/v4/groups/1/projects",
                json!([{
                    "id": 101, "name": "p", "path_with_namespace": "g/p",
                    "namespace": { "id": 1, "full_path": "g" },
                }]),
            ),
            (
                "https://gitlab.example.com/api/v4/projects",
                json!([{
                    "id": 101, "name": "p", "path_with_namespace": "g/p",
                    "namespace": { "id": 1, "full_path": "g" },
                }]),
            ),
        ]),
        |_| {},
    );

    fx.processor.process(descriptor(Command::GroupProjectDiscovery, None, None)).await;

    let envelopes = fx.handle.take_queued();
    let discovered: Vec<&Envelope> = envelopes
        .iter()
        .filter(|e| e.message_kind() == Some(MessageKind::JobsDiscovered))
        .collect();
    assert_eq!(discovered.len(), 1);

    let data = &discovered[0].data;
    assert_eq!(data["discovery_summary"]["total_groups"], json!(1));
    assert_eq!(data["discovery_summary"]["total_projects"], json!(1));
    // The project appeared in both listings but is deduplicated by id.
    let entries = data["discovered_jobs"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["job_type"], json!("crawl_group"));
    assert_eq!(entries[1]["job_type"], json!("crawl_project"));
    assert_eq!(entries[1]["namespace_path"], json!("g/p"));

    // Terminal completion with both counters.
    let completed = envelopes.last().unwrap();
    assert_eq!(completed.message_kind(), Some(MessageKind::JobCompleted));
    assert_eq!(completed.data["finalCounts"]["groups"], json!(1));
    assert_eq!(completed.data["finalCounts"]["projects"], json!(1));

    // The area list is persisted locally.
    let areas = fx.artifacts.load_items("areas", "areas").unwrap();
    assert_eq!(areas.len(), 2);
}

#[tokio::test]
async fn milestones_tolerate_missing_group_scope() {
    // Project milestones exist; the group-scoped endpoint 404s.
    let fx = fixture(
        RouteFetch::new(vec![(
            "https://gitlab.example.com/api/v4/projects/101/milestones",
            json!([{ "id": 5, "title": "v1" }]),
        )]),
        |_| {},
    );

    fx.processor.process(descriptor(Command::FetchMilestones, Some("g/p"), Some("101"))).await;

    let envelopes = fx.handle.take_queued();
    let completed = envelopes.last().unwrap();
    assert_eq!(completed.message_kind(), Some(MessageKind::JobCompleted));
    assert_eq!(completed.data["finalCounts"]["milestones"], json!(1));
}
