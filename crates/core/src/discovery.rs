// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovered-entity payloads exchanged in `jobs_discovered` messages.

use crate::command::DiscoveredKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entity reported by a discovery crawl.
///
/// Parsed element-by-element from the wire array so a single malformed
/// entry is dropped instead of rejecting the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredJob {
    pub job_type: DiscoveredKind,
    #[serde(deserialize_with = "entity_id_from_string_or_number")]
    pub entity_id: String,
    pub namespace_path: String,
    pub entity_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<u64>,
}

impl DiscoveredJob {
    /// Parse a raw array element, returning `None` for malformed entries.
    pub fn from_value(value: &Value) -> Option<Self> {
        let parsed: Self = serde_json::from_value(value.clone()).ok()?;
        if parsed.entity_id.is_empty()
            || parsed.namespace_path.is_empty()
            || parsed.entity_name.is_empty()
        {
            return None;
        }
        Some(parsed)
    }
}

/// GitLab ids arrive as numbers from the REST API and as strings from
/// older crawler builds; accept both.
fn entity_id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "entity_id must be a string or number, got {other}"
        ))),
    }
}

/// Totals attached to a `jobs_discovered` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    #[serde(default)]
    pub total_groups: u64,
    #[serde(default)]
    pub total_projects: u64,
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
