//! 429 with Retry-After delays the crawl, never fails it.

use crate::prelude::*;
use fw_core::{AreaType, Command, JobStatus};
use fw_crawler::HttpResponse;
use serde_json::json;
use std::time::Instant;

#[tokio::test]
async fn rate_limited_page_is_retried_after_backoff() {
    let upstream = FakeUpstream::new();
    let issues = "https://gitlab.example.com/api/v4/projects/101/issues";
    upstream.push_response(
        issues,
        HttpResponse {
            status: 429,
            status_text: "Too Many Requests".into(),
            retry_after_secs: Some(1),
            body: String::new(),
        },
    );
    upstream.route(issues, json!([{ "id": 1 }]));

    let pipeline = start_pipeline(upstream, PipelineOptions::default()).await;
    pipeline.seed_area("g/p", 101, AreaType::Project);
    let started = Instant::now();
    let job = pipeline.seed_job(Command::FetchIssues, Some("g/p"));

    assert!(
        wait_for(|| {
            pipeline
                .store
                .get_job(job.id.as_str())
                .is_some_and(|j| j.status == JobStatus::Finished)
        })
        .await,
        "job should finish after the back-off"
    );
    // The back-off was honored before the retry.
    assert!(started.elapsed().as_millis() >= 1_000);

    // Same page requested twice, then done; never a third request.
    let issue_requests =
        pipeline.upstream.requests().iter().filter(|(p, _)| p == issues).count();
    assert_eq!(issue_requests, 2);

    // Delayed, not failed.
    let row = pipeline.store.get_job(job.id.as_str()).unwrap();
    assert_eq!(row.status, JobStatus::Finished);
    assert_eq!(row.progress.entities.get("issues"), Some(&1));

    pipeline.cancel.cancel();
}
