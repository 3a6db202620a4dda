// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job progress payloads and resume cursors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Structured progress attached to a job row.
///
/// `extra` carries free-form keys merged in by handlers (discovery
/// summaries, worker metadata) without schema churn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Fraction of the job considered done, in `[0, 1]`.
    #[serde(default)]
    pub overall_completion: f64,
    /// Per entity-type counters (e.g. `issues → 42`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub entities: HashMap<String, u64>,
    /// Epoch ms of the last progress write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Progress {
    /// Deep-merge a JSON object into this progress record.
    ///
    /// Typed fields are replaced when present; entity counters merge
    /// per key; everything else lands in `extra`. Non-object values
    /// are ignored.
    pub fn merge_value(&mut self, patch: &Value) {
        let Some(obj) = patch.as_object() else { return };
        for (key, value) in obj {
            match key.as_str() {
                "overall_completion" => {
                    if let Some(f) = value.as_f64() {
                        self.overall_completion = f.clamp(0.0, 1.0);
                    }
                }
                "entities" => {
                    if let Some(entities) = value.as_object() {
                        for (etype, count) in entities {
                            if let Some(n) = count.as_u64() {
                                self.entities.insert(etype.clone(), n);
                            }
                        }
                    }
                }
                "last_update_ms" => {
                    if let Some(ms) = value.as_u64() {
                        self.last_update_ms = Some(ms);
                    }
                }
                "message" => {
                    if let Some(s) = value.as_str() {
                        self.message = Some(s.to_string());
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Record a per-entity counter and bump completion when a total is known.
    pub fn record(&mut self, entity_type: &str, processed: u64, total: Option<u64>, now_ms: u64) {
        self.entities.insert(entity_type.to_string(), processed);
        if let Some(total) = total {
            if total > 0 {
                self.overall_completion = (processed as f64 / total as f64).clamp(0.0, 1.0);
            }
        }
        self.last_update_ms = Some(now_ms);
    }

    /// Mark the job fully complete.
    pub fn complete(&mut self, now_ms: u64) {
        self.overall_completion = 1.0;
        self.last_update_ms = Some(now_ms);
    }
}

/// Cursor for restarting a partially-crawled job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ResumeState {
    pub fn at_page(page: u32) -> Self {
        Self { current_page: Some(page), ..Self::default() }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
