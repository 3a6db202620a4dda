// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn merge_replaces_typed_fields() {
    let mut progress = Progress::default();
    progress.merge_value(&json!({
        "overall_completion": 0.5,
        "message": "halfway",
        "last_update_ms": 123,
    }));

    assert_eq!(progress.overall_completion, 0.5);
    assert_eq!(progress.message.as_deref(), Some("halfway"));
    assert_eq!(progress.last_update_ms, Some(123));
}

#[test]
fn merge_clamps_completion() {
    let mut progress = Progress::default();
    progress.merge_value(&json!({ "overall_completion": 3.7 }));
    assert_eq!(progress.overall_completion, 1.0);
}

#[test]
fn merge_combines_entity_counters() {
    let mut progress = Progress::default();
    progress.merge_value(&json!({ "entities": { "issues": 10 } }));
    progress.merge_value(&json!({ "entities": { "commits": 4 } }));

    assert_eq!(progress.entities.get("issues"), Some(&10));
    assert_eq!(progress.entities.get("commits"), Some(&4));
}

#[test]
fn merge_keeps_unknown_keys_in_extra() {
    let mut progress = Progress::default();
    progress.merge_value(&json!({ "spawned_job_ids": ["a", "b"] }));

    assert_eq!(progress.extra.get("spawned_job_ids"), Some(&json!(["a", "b"])));
}

#[test]
fn merge_is_idempotent() {
    let patch = json!({
        "overall_completion": 0.25,
        "entities": { "issues": 7 },
        "stage": "fetching",
    });
    let mut once = Progress::default();
    once.merge_value(&patch);
    let mut twice = once.clone();
    twice.merge_value(&patch);

    assert_eq!(once, twice);
}

#[test]
fn merge_ignores_non_objects() {
    let mut progress = Progress::default();
    progress.merge_value(&json!("not an object"));
    assert_eq!(progress, Progress::default());
}

#[test]
fn record_derives_completion_from_total() {
    let mut progress = Progress::default();
    progress.record("issues", 25, Some(100), 99);

    assert_eq!(progress.overall_completion, 0.25);
    assert_eq!(progress.entities.get("issues"), Some(&25));
    assert_eq!(progress.last_update_ms, Some(99));
}

#[test]
fn record_without_total_keeps_completion() {
    let mut progress = Progress::default();
    progress.record("issues", 25, None, 99);
    assert_eq!(progress.overall_completion, 0.0);
}

#[test]
fn resume_state_roundtrip_omits_empty_fields() {
    let state = ResumeState::at_page(3);
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json, json!({ "current_page": 3 }));
}
