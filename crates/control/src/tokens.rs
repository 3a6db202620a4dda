// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token refresh coordination.
//!
//! The crawler asks for a fresh token by job id; the coordinator finds
//! the owning account, calls the provider-specific refresher, and
//! answers on the same connection. The crawler correlates the response
//! by job id.

use crate::bridge::{AdminBridge, AdminEvent};
use crate::connection::Connection;
use crate::service::ServiceError;
use fw_core::{Account, Clock, JobId, JobStatus, Provider};
use fw_storage::Store;
use fw_wire::{Envelope, MessageKind, TokenRefreshResponseData};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of a provider refresh call.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    /// The grant was revoked; stored tokens must be cleared.
    #[error("refresh grant is no longer valid")]
    InvalidGrant,

    #[error("account has no refresh token")]
    MissingRefreshToken,

    #[error("provider error: {0}")]
    Provider(String),
}

/// Provider-specific OAuth refresher.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, account: &Account) -> Result<RefreshedToken, RefreshError>;
}

/// Correlates refresh requests with the OAuth refreshers and responds.
pub struct TokenCoordinator<C: Clock> {
    store: Arc<Store>,
    bridge: AdminBridge,
    clock: C,
    refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
}

impl<C: Clock> TokenCoordinator<C> {
    pub fn new(store: Arc<Store>, bridge: AdminBridge, clock: C) -> Self {
        Self { store, bridge, clock, refreshers: HashMap::new() }
    }

    pub fn register_refresher(&mut self, provider: Provider, refresher: Arc<dyn TokenRefresher>) {
        self.refreshers.insert(provider, refresher);
    }

    /// Handle one `token_refresh_request`.
    ///
    /// The job parks in `waiting_credential_renewal` for the duration;
    /// success returns it to `running`, failure ends it for good.
    pub async fn handle_request(
        &self,
        connection: &Arc<Connection>,
        job_id: &str,
    ) -> Result<(), ServiceError> {
        let id = JobId::from_string(job_id);
        let now_ms = self.clock.epoch_ms();

        let Some(job) = self.store.get_job(id.as_str()) else {
            tracing::warn!(job = %id, "refresh requested for unknown job");
            self.respond(connection, job_id, TokenRefreshResponseData {
                access_token: None,
                refresh_successful: false,
                expires_at: None,
            })
            .await;
            return Ok(());
        };

        if job.status == JobStatus::Running {
            self.store.update_status(&id, JobStatus::WaitingCredentialRenewal, now_ms)?;
        }

        let account = self.store.get_account(&job.account_id);
        let refresher = self.refreshers.get(&job.provider);

        let refreshed = match (&account, refresher) {
            (Some(account), Some(refresher)) => refresher.refresh(account).await,
            (None, _) => Err(RefreshError::Provider(format!(
                "account {} not found",
                job.account_id
            ))),
            (_, None) => Err(RefreshError::Provider(format!(
                "no refresher for provider {}",
                job.provider
            ))),
        };

        match refreshed {
            Ok(token) => {
                self.store.set_account_tokens(
                    &job.account_id,
                    token.access_token.clone(),
                    token.refresh_token.clone(),
                    token.expires_at_ms,
                )?;
                let job = self.store.get_job(id.as_str());
                if job.is_some_and(|j| j.status == JobStatus::WaitingCredentialRenewal) {
                    self.store.update_status(&id, JobStatus::Running, self.clock.epoch_ms())?;
                }
                tracing::info!(job = %id, "token refreshed");
                self.bridge.publish(AdminEvent::TokenRefreshed { job_id: id, successful: true });
                self.respond(connection, job_id, TokenRefreshResponseData {
                    access_token: Some(token.access_token),
                    refresh_successful: true,
                    expires_at: token.expires_at_ms,
                })
                .await;
            }
            Err(err) => {
                if matches!(err, RefreshError::InvalidGrant) {
                    if let Err(clear_err) = self.store.clear_account_tokens(&job.account_id) {
                        tracing::warn!(account = %job.account_id, error = %clear_err, "token clear failed");
                    }
                }
                tracing::warn!(job = %id, error = %err, "token refresh failed");
                self.store.mark_failed(
                    &id,
                    format!("token refresh failed: {err}"),
                    false,
                    None,
                    self.clock.epoch_ms(),
                )?;
                self.bridge.publish(AdminEvent::TokenRefreshed { job_id: id, successful: false });
                self.respond(connection, job_id, TokenRefreshResponseData {
                    access_token: None,
                    refresh_successful: false,
                    expires_at: None,
                })
                .await;
            }
        }
        Ok(())
    }

    async fn respond(
        &self,
        connection: &Arc<Connection>,
        job_id: &str,
        data: TokenRefreshResponseData,
    ) {
        let envelope = Envelope::new(
            MessageKind::TokenRefreshResponse,
            Some(job_id.to_string()),
            serde_json::to_value(&data).unwrap_or_default(),
        );
        if let Err(err) = connection.send(&envelope).await {
            tracing::warn!(connection = connection.id(), error = %err, "refresh response not delivered");
        }
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
