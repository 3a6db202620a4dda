// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accounts and source-service providers.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier for an authenticated account on the source service.
    pub struct AccountId("acct-");
}

/// Which flavor of GitLab an account talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "gitlab-cloud")]
    GitlabCloud,
    #[serde(rename = "gitlab-onprem")]
    GitlabOnprem,
}

crate::simple_display! {
    Provider {
        GitlabCloud => "gitlab-cloud",
        GitlabOnprem => "gitlab-onprem",
    }
}

/// An authenticated account and its OAuth credentials.
///
/// Tokens are nullable: a revoked grant clears them, and jobs for the
/// account stop being handed out until the user re-authorizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub provider: Provider,
    pub api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires_at_ms: Option<u64>,
}

impl Account {
    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Drop both tokens (e.g. after an `invalid_grant` from the provider).
    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expires_at_ms = None;
    }
}
