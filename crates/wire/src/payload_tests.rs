// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn heartbeat_uses_camel_case_keys() {
    let data = HeartbeatData {
        active_jobs: 2,
        total_processed: 17,
        system_status: SystemStatus::Processing,
    };
    let value = serde_json::to_value(&data).unwrap();
    assert_eq!(
        value,
        json!({ "activeJobs": 2, "totalProcessed": 17, "systemStatus": "processing" })
    );
}

#[test]
fn job_descriptor_wire_shape() {
    let descriptor = JobDescriptor {
        id: "job-1".into(),
        entity_type: Command::FetchIssues,
        entity_id: Some("101".into()),
        full_path: Some("g/p".into()),
        gitlab_url: "https://gitlab.example.com".into(),
        access_token: "T1".into(),
        resume_state: None,
        options: Map::new(),
    };
    let value = serde_json::to_value(&descriptor).unwrap();
    assert_eq!(value["entityType"], json!("FETCH_ISSUES"));
    assert_eq!(value["gitlabUrl"], json!("https://gitlab.example.com"));
    assert_eq!(value["accessToken"], json!("T1"));
    assert!(value.get("resumeState").is_none());
}

#[test]
fn job_failed_roundtrip() {
    let data = JobFailedData {
        error: "HTTP 500".into(),
        error_type: Some("http".into()),
        is_recoverable: true,
        resume_state: Some(fw_core::ResumeState::at_page(7)),
        partial_counts: Some([("issues".to_string(), 12u64)].into_iter().collect()),
    };
    let value = serde_json::to_value(&data).unwrap();
    assert_eq!(value["isRecoverable"], json!(true));
    assert_eq!(value["resumeState"]["current_page"], json!(7));

    let back: JobFailedData = serde_json::from_value(value).unwrap();
    assert_eq!(back, data);
}

#[test]
fn jobs_discovered_accepts_malformed_elements() {
    let value = json!({
        "discovered_jobs": [
            { "job_type": "crawl_group", "entity_id": 1, "namespace_path": "g", "entity_name": "g" },
            { "job_type": "bogus" },
            "not even an object",
        ],
        "discovery_summary": { "total_groups": 1, "total_projects": 0 },
    });
    let data: JobsDiscoveredData = serde_json::from_value(value).unwrap();
    assert_eq!(data.discovered_jobs.len(), 3);
    assert_eq!(data.discovery_summary.total_groups, 1);
}

#[test]
fn completed_defaults_empty_counts() {
    let data: JobCompletedData = serde_json::from_value(json!({ "success": true })).unwrap();
    assert!(data.final_counts.is_empty());
    assert!(data.success);
}

#[test]
fn refresh_response_failure_shape() {
    let data = TokenRefreshResponseData {
        access_token: None,
        refresh_successful: false,
        expires_at: None,
    };
    let value = serde_json::to_value(&data).unwrap();
    assert_eq!(value, json!({ "refreshSuccessful": false }));
}
