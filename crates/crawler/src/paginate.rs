// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GitLab pagination with rate-limit handling.
//!
//! Pages advance only after a successful parse; 429 sleeps `Retry-After`
//! and retries the same page, so a rate-limited crawl is delayed, never
//! failed. A 401 surfaces to the caller, which can renew the token via
//! [`Paginator::set_token`] and call again for the same page.

use crate::error::CrawlError;
use crate::http::GitLabFetch;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Pages through one endpoint.
pub struct Paginator<'a, F: GitLabFetch + ?Sized> {
    fetch: &'a F,
    url: String,
    token: String,
    params: Vec<(String, String)>,
    per_page: u32,
    page: u32,
    exhausted: bool,
    repair_json: bool,
}

impl<'a, F: GitLabFetch + ?Sized> Paginator<'a, F> {
    pub fn new(fetch: &'a F, url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            fetch,
            url: url.into(),
            token: token.into(),
            params: Vec::new(),
            per_page: 100,
            page: 1,
            exhausted: false,
            repair_json: false,
        }
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Resume from a cursor instead of page 1.
    pub fn starting_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn repair_json(mut self, enabled: bool) -> Self {
        self.repair_json = enabled;
        self
    }

    /// The page the next fetch will request; persisted as resume state.
    pub fn current_page(&self) -> u32 {
        self.page
    }

    /// Swap in a renewed bearer token.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    /// Fetch the next page. `Ok(None)` once the endpoint is exhausted.
    ///
    /// The page counter does not advance on error, so the same page is
    /// retried after the caller recovers (e.g. token renewal).
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, CrawlError> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            let url = self.page_url();
            let response = self.fetch.get(&url, &self.token).await?;

            if response.status == 429 {
                let wait = response.retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                tracing::info!(url, wait_secs = wait, "rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
            if !response.is_success() {
                return Err(CrawlError::http(response.status, response.status_text));
            }

            let items = self.parse_items(&response.body)?;
            let has_more = items.len() as u32 == self.per_page;
            self.page += 1;
            if !has_more {
                self.exhausted = true;
            }
            return Ok(Some(items));
        }
    }

    /// Drain every remaining page into one vector.
    pub async fn collect_all(&mut self) -> Result<Vec<Value>, CrawlError> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    fn page_url(&self) -> String {
        let mut query = format!("per_page={}&page={}", self.per_page, self.page);
        for (key, value) in &self.params {
            query.push('&');
            query.push_str(key);
            query.push('=');
            query.push_str(value);
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, query)
    }

    fn parse_items(&self, body: &str) -> Result<Vec<Value>, CrawlError> {
        let parsed = serde_json::from_str::<Value>(body).ok().or_else(|| {
            if self.repair_json {
                repair(body).and_then(|fixed| serde_json::from_str(&fixed).ok())
            } else {
                None
            }
        });
        let Some(value) = parsed else {
            return Err(CrawlError::Parse { snippet: snippet(body) });
        };
        Ok(match value {
            Value::Array(items) => items,
            // A detail endpoint returns one object; treat it as one item.
            other => vec![other],
        })
    }
}

fn snippet(body: &str) -> String {
    let mut end = body.len().min(200);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Single best-effort repair pass for almost-JSON bodies.
///
/// Quotes unquoted identifier keys and bare identifier values, then
/// wraps in `[]` when the result is not already an array or object.
/// Heuristic: payloads may be altered, which is why it is off by
/// default (`repair_json = false`).
fn repair(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    // `{key: value}` → `{"key": value}`
    let keys = regex::Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)"#).ok()?;
    let mut fixed = keys.replace_all(trimmed, "$1\"$2\"$3").into_owned();

    // `: bareword` → `: "bareword"` for non-JSON literals.
    let values = regex::Regex::new(r#"(:\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*[,}\]])"#).ok()?;
    fixed = values
        .replace_all(&fixed, |caps: &regex::Captures<'_>| {
            let word = &caps[2];
            if matches!(word, "true" | "false" | "null") {
                format!("{}{}{}", &caps[1], word, &caps[3])
            } else {
                format!("{}\"{}\"{}", &caps[1], word, &caps[3])
            }
        })
        .into_owned();

    if !(fixed.starts_with('[') || fixed.starts_with('{')) {
        fixed = format!("[{fixed}]");
    }
    Some(fixed)
}

#[cfg(test)]
#[path = "paginate_tests.rs"]
mod tests;
