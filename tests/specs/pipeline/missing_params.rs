//! A collection job without its path parameter is a designed no-op.

use crate::prelude::*;
use fw_core::{Command, JobStatus};

#[tokio::test]
async fn issues_job_without_id_completes_with_zero_items() {
    let upstream = FakeUpstream::new();
    let pipeline = start_pipeline(upstream, PipelineOptions::default()).await;

    // No full_path, no entity id: nothing to resolve `:id` from.
    let job = pipeline.seed_job(Command::FetchIssues, None);

    assert!(
        wait_for(|| {
            pipeline
                .store
                .get_job(job.id.as_str())
                .is_some_and(|j| j.status == JobStatus::Finished)
        })
        .await,
        "no-op job should still finish"
    );

    let row = pipeline.store.get_job(job.id.as_str()).unwrap();
    assert_eq!(row.progress.entities.get("issues"), Some(&0));
    assert!(row.finished_at_ms.is_some());

    // No HTTP request was ever issued.
    assert_eq!(pipeline.upstream.request_count(), 0);

    pipeline.cancel.cancel();
}
