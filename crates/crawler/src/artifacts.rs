// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local persistence of fetched entities.
//!
//! Layout: `data_dir/<storage_key>/<entity_type>.jsonl`, one JSON item
//! per line, written to a temp file and renamed into place.

use crate::error::CrawlError;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Writes crawl output under the data directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    data_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    /// Persist one batch, replacing any previous file for the same key
    /// and entity type. Returns the written path.
    pub fn store_items(
        &self,
        storage_key: &str,
        entity_type: &str,
        items: &[Value],
    ) -> Result<PathBuf, CrawlError> {
        let dir = self.data_dir.join(sanitize_key(storage_key));
        std::fs::create_dir_all(&dir)?;

        let target = dir.join(format!("{}.jsonl", sanitize_component(entity_type)));
        let tmp = target.with_extension("jsonl.tmp");

        let mut lines = Vec::new();
        for item in items {
            serde_json::to_writer(&mut lines, item)?;
            lines.push(b'\n');
        }
        std::fs::write(&tmp, &lines)?;
        std::fs::rename(&tmp, &target)?;
        tracing::debug!(path = %target.display(), items = items.len(), "artifacts written");
        Ok(target)
    }

    /// Read a batch back (used by tests and the exporter).
    pub fn load_items(&self, storage_key: &str, entity_type: &str) -> Result<Vec<Value>, CrawlError> {
        let path = self
            .data_dir
            .join(sanitize_key(storage_key))
            .join(format!("{}.jsonl", sanitize_component(entity_type)));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut items = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(line)?);
        }
        Ok(items)
    }
}

/// A storage key keeps its `/` hierarchy but every component is cleaned.
fn sanitize_key(key: &str) -> PathBuf {
    key.split('/').filter(|c| !c.is_empty()).map(sanitize_component).collect()
}

/// Strip path tricks and odd characters from one path component.
fn sanitize_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

impl AsRef<Path> for ArtifactStore {
    fn as_ref(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
