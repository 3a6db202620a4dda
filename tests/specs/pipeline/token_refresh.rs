//! 401 → token refresh → retry, transparent to the job.

use crate::prelude::*;
use fw_core::{AccountId, AreaType, Command, JobStatus};
use fw_crawler::HttpResponse;
use serde_json::json;

#[tokio::test]
async fn expired_token_is_renewed_mid_job() {
    let upstream = FakeUpstream::new();
    let issues = "https://gitlab.example.com/api/v4/projects/101/issues";
    upstream.push_response(
        issues,
        HttpResponse {
            status: 401,
            status_text: "Unauthorized".into(),
            retry_after_secs: None,
            body: String::new(),
        },
    );
    upstream.route(issues, json!([{ "id": 1, "author_name": "Ada" }]));

    let pipeline = start_pipeline(
        upstream,
        PipelineOptions {
            refresher: Some(StaticRefresher { token: "T2".into() }),
            ..PipelineOptions::default()
        },
    )
    .await;
    pipeline.seed_area("g/p", 101, AreaType::Project);
    let job = pipeline.seed_job(Command::FetchIssues, Some("g/p"));

    assert!(
        wait_for(|| {
            pipeline
                .store
                .get_job(job.id.as_str())
                .is_some_and(|j| j.status == JobStatus::Finished)
        })
        .await,
        "job should finish after renewal"
    );

    // The retry used the renewed token on the same URL.
    let requests = pipeline.upstream.requests();
    let issue_requests: Vec<_> = requests.iter().filter(|(path, _)| path == issues).collect();
    assert_eq!(issue_requests.len(), 2);
    assert_eq!(issue_requests[0].1, "T1");
    assert_eq!(issue_requests[1].1, "T2");

    // The stored account now carries the new token.
    let account = pipeline.store.get_account(&AccountId::from_string("acct-1")).unwrap();
    assert_eq!(account.access_token.as_deref(), Some("T2"));

    let row = pipeline.store.get_job(job.id.as_str()).unwrap();
    assert_eq!(row.progress.entities.get("issues"), Some(&1));

    pipeline.cancel.cancel();
}

#[tokio::test]
async fn refresh_failure_ends_the_job_for_good() {
    let upstream = FakeUpstream::new();
    let issues = "https://gitlab.example.com/api/v4/projects/101/issues";
    // 401 forever and no refresher registered on the control plane.
    upstream.push_response(
        issues,
        HttpResponse {
            status: 401,
            status_text: "Unauthorized".into(),
            retry_after_secs: None,
            body: String::new(),
        },
    );

    let pipeline = start_pipeline(upstream, PipelineOptions::default()).await;
    pipeline.seed_area("g/p", 101, AreaType::Project);
    let job = pipeline.seed_job(Command::FetchIssues, Some("g/p"));

    assert!(
        wait_for(|| {
            pipeline
                .store
                .get_job(job.id.as_str())
                .is_some_and(|j| j.status == JobStatus::Failed)
        })
        .await,
        "job should fail when the refresh is refused"
    );
    // Not recoverable: the resume cursor is gone.
    assert!(pipeline.store.get_job(job.id.as_str()).unwrap().resume_state.is_none());

    pipeline.cancel.cancel();
}
