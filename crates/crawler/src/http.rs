// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP seam between the paginator and the GitLab REST API.
//!
//! Production uses reqwest; tests drive the paginator and processor
//! through fake implementations.

use crate::error::CrawlError;
use async_trait::async_trait;

/// What the paginator needs from one response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Parsed `Retry-After` header, seconds.
    pub retry_after_secs: Option<u64>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Async GET with bearer auth.
#[async_trait]
pub trait GitLabFetch: Send + Sync {
    async fn get(&self, url: &str, token: &str) -> Result<HttpResponse, CrawlError>;
}

/// reqwest-backed fetcher.
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitLabFetch for ReqwestFetch {
    async fn get(&self, url: &str, token: &str) -> Result<HttpResponse, CrawlError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| CrawlError::Transport(err.to_string()))?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response
            .text()
            .await
            .map_err(|err| CrawlError::Transport(err.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            retry_after_secs,
            body,
        })
    }
}
