// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl failure taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Non-2xx upstream response (429 is retried before this surfaces).
    #[error("HTTP {status} {status_text}")]
    Http { status: u16, status_text: String },

    /// Upstream body that would not parse even after repair.
    #[error("unparseable response body: {snippet}")]
    Parse { snippet: String },

    /// Transport-level failure talking to the upstream.
    #[error("request error: {0}")]
    Transport(String),

    /// Token refresh did not produce a usable token.
    #[error("credential renewal failed")]
    RefreshFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        CrawlError::Http { status, status_text: status_text.into() }
    }

    /// Whether a retry without user intervention can succeed.
    ///
    /// 401 is handled by the refresh path before failing; 403 means
    /// the user must re-authorize; 5xx and parse errors are worth a
    /// retry on the next poll.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CrawlError::Http { status, .. } => matches!(status, 500..=599 | 408 | 429),
            CrawlError::Parse { .. } => true,
            CrawlError::Transport(_) => true,
            CrawlError::RefreshFailed => false,
            CrawlError::Io(_) => true,
            CrawlError::Json(_) => false,
        }
    }

    /// Short machine-readable class for `job_failed.errorType`.
    pub fn error_type(&self) -> &'static str {
        match self {
            CrawlError::Http { .. } => "http",
            CrawlError::Parse { .. } => "parse",
            CrawlError::Transport(_) => "transport",
            CrawlError::RefreshFailed => "auth",
            CrawlError::Io(_) => "io",
            CrawlError::Json(_) => "serialization",
        }
    }
}
