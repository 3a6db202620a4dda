// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal task representation for one received job.

use fw_core::{Command, ResumeState};
use fw_wire::JobDescriptor;
use serde_json::{Map, Value};

/// One job, normalized for execution.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub id: String,
    pub command: Command,
    pub api_base: String,
    pub access_token: String,
    pub options: Map<String, Value>,
    pub resume: Option<ResumeState>,
}

impl CrawlTask {
    /// Convert a wire descriptor, normalizing the API base URL and
    /// folding `entity_id`/`full_path` into the options map.
    pub fn from_descriptor(descriptor: JobDescriptor) -> Self {
        let mut options = descriptor.options;
        if let Some(entity_id) = &descriptor.entity_id {
            options.entry("id".to_string()).or_insert_with(|| Value::String(entity_id.clone()));
        }
        if let Some(full_path) = &descriptor.full_path {
            options
                .entry("full_path".to_string())
                .or_insert_with(|| Value::String(full_path.clone()));
            // GitLab accepts a URL-encoded full path wherever :id goes.
            options
                .entry("id".to_string())
                .or_insert_with(|| Value::String(encode_path(full_path)));
        }
        Self {
            id: descriptor.id,
            command: descriptor.entity_type,
            api_base: normalize_api_base(&descriptor.gitlab_url),
            access_token: descriptor.access_token,
            options,
            resume: descriptor.resume_state,
        }
    }

    /// Resolve one `:param`, honoring the historical aliases.
    pub fn resolve_param(&self, name: &str) -> Option<String> {
        let aliases: &[&str] = match name {
            "id" => &["id", "project_id", "group_id", "resourceId"],
            "project_id" => &["project_id", "id", "resourceId"],
            "group_id" => &["group_id", "id", "resourceId"],
            other => return self.option_string(other),
        };
        aliases.iter().find_map(|alias| self.option_string(alias))
    }

    /// Fill a template like `/api/v4/projects/:id/issues`; `Err` names
    /// the parameters that could not be resolved.
    pub fn resolve_endpoint(&self, template: &str) -> Result<String, Vec<String>> {
        let mut missing = Vec::new();
        let resolved: Vec<String> = template
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(param) => self.resolve_param(param).unwrap_or_else(|| {
                    missing.push(param.to_string());
                    String::new()
                }),
                None => segment.to_string(),
            })
            .collect();
        if missing.is_empty() {
            Ok(format!("{}{}", self.api_base, resolved.join("/")))
        } else {
            Err(missing)
        }
    }

    /// Key under which this task's artifacts are stored.
    pub fn storage_key(&self) -> String {
        if let Some(path) = self.option_string("full_path") {
            return path;
        }
        let entity_type = self.command.entity_type();
        match self.option_string("id") {
            Some(id) => format!("{entity_type}/{id}"),
            None => entity_type.to_string(),
        }
    }

    fn option_string(&self, key: &str) -> Option<String> {
        match self.options.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Strip API suffixes (`/api/graphql`, `/api/v4`, …) and trailing
/// slashes so endpoint templates can be appended verbatim.
pub fn normalize_api_base(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let stripped = strip_api_suffix(parsed.path()).to_string();
            parsed.set_path(&stripped);
            let mut out = parsed.to_string();
            while out.ends_with('/') {
                out.pop();
            }
            out
        }
        // Not a URL: apply the same edits as plain string surgery.
        Err(_) => {
            let mut out = strip_api_suffix(raw).to_string();
            while out.ends_with('/') {
                out.pop();
            }
            out
        }
    }
}

fn strip_api_suffix(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if let Some(idx) = trimmed.find("/api/graphql") {
        return &trimmed[..idx];
    }
    if let Some(idx) = trimmed.find("/api/v") {
        // Only strip version-shaped suffixes: /api/v4, /api/v4.2, …
        let rest = &trimmed[idx + "/api/v".len()..];
        let version_like = rest
            .split('/')
            .next()
            .is_some_and(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '.'));
        if version_like {
            return &trimmed[..idx];
        }
    }
    trimmed
}

/// Percent-encode one namespace path for use as a path parameter.
fn encode_path(path: &str) -> String {
    path.replace('/', "%2F")
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
