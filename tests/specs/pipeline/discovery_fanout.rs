//! Discovery fan-out end to end: one discovery job becomes areas,
//! grants, and a tree of queued collection jobs.

use crate::prelude::*;
use fw_core::{AreaType, Command, JobStatus};
use fw_storage::JobQuery;
use serde_json::json;

#[tokio::test]
async fn discovery_fans_out_into_collection_jobs() {
    let upstream = FakeUpstream::new();
    upstream.route("https://gitlab.example.com/api/v4/groups", json!([
        { "id": 1, "full_path": "g", "name": "g" },
    ]));
    upstream.route("https://gitlab.example.com/api/v4/groups/1/projects", json!([
        {
            "id": 101, "path_with_namespace": "g/p", "name": "p",
            "namespace": { "id": 1, "full_path": "g" },
        },
    ]));
    // The global listing returns the same project; dedup by id.
    upstream.route("https://gitlab.example.com/api/v4/projects", json!([
        {
            "id": 101, "path_with_namespace": "g/p", "name": "p",
            "namespace": { "id": 1, "full_path": "g" },
        },
    ]));

    let pipeline = start_pipeline(upstream, PipelineOptions::default()).await;
    let parent = pipeline.seed_job(Command::GroupProjectDiscovery, None);

    // The parent finishes and the fan-out lands.
    assert!(
        wait_for(|| {
            pipeline
                .store
                .get_job(parent.id.as_str())
                .is_some_and(|j| j.status == JobStatus::Finished)
        })
        .await,
        "discovery job should finish"
    );
    assert!(
        wait_for(|| {
            pipeline
                .store
                .query_jobs(&JobQuery::default())
                .iter()
                .filter(|j| j.spawned_from == Some(parent.id))
                .count()
                >= 2
        })
        .await,
        "fan-out jobs should be created"
    );

    // Area table: ("g", group) and ("g/p", project), both authorized.
    let group = pipeline.store.get_area("g").expect("group area");
    assert_eq!(group.kind, AreaType::Group);
    assert_eq!(group.gitlab_id, 1);
    let project = pipeline.store.get_area("g/p").expect("project area");
    assert_eq!(project.kind, AreaType::Project);
    assert_eq!(project.gitlab_id, 101);

    // One job per entry plus the sub-fan-out set, all linked to the parent.
    let children: Vec<_> = pipeline
        .store
        .query_jobs(&JobQuery::default())
        .into_iter()
        .filter(|j| j.spawned_from == Some(parent.id))
        .collect();
    assert_eq!(children.len(), 19);
    assert!(children.iter().any(|j| j.command == Command::FetchGroups));
    assert!(children.iter().any(|j| j.command == Command::FetchProjects));
    assert!(children.iter().any(|j| j.command == Command::FetchIssues));
    assert!(children.iter().any(|j| j.command == Command::FetchEpics));

    // Exactly one jobs_discovered was emitted: the parent carries one
    // summary and one spawned-id list matching the children.
    let parent_row = pipeline.store.get_job(parent.id.as_str()).unwrap();
    assert_eq!(
        parent_row.progress.extra.get("discovery_summary"),
        Some(&json!({ "total_groups": 1, "total_projects": 1 }))
    );
    let spawned_ids = parent_row.progress.extra.get("spawned_job_ids").unwrap();
    assert_eq!(spawned_ids.as_array().unwrap().len(), 19);

    pipeline.cancel.cancel();
}
