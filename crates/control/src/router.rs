// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message router: schema validation, middleware, handler dispatch.
//!
//! A dispatch table keyed by message kind, each entry a priority-ordered
//! handler list. The first handler whose `can_handle` accepts runs;
//! later handlers get a turn only after a `success: false` result.

use crate::connection::Connection;
use async_trait::async_trait;
use fw_wire::{Envelope, EnvelopeError, MessageKind};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Outcome a handler reports back through the router.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerResult {
    pub success: bool,
    pub error: Option<String>,
}

impl HandlerResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// A registered message handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Message kinds this handler registers for.
    fn kinds(&self) -> &'static [MessageKind];

    /// Higher runs earlier within a kind's handler list.
    fn priority(&self) -> i32 {
        0
    }

    /// Cheap predicate consulted before invocation.
    fn can_handle(&self, _envelope: &Envelope) -> bool {
        true
    }

    async fn handle(&self, connection: &Arc<Connection>, envelope: &Envelope) -> HandlerResult;
}

/// Hooks around handler invocation. `before` may rewrite the message.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Higher runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    async fn before_process(&self, envelope: Envelope, _connection: &Arc<Connection>) -> Envelope {
        envelope
    }

    async fn after_process(
        &self,
        _envelope: &Envelope,
        _result: &HandlerResult,
        _connection: &Arc<Connection>,
    ) {
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no handler for message type {0:?}")]
    NoHandler(String),

    #[error("validation error: {0}")]
    Validation(#[from] EnvelopeError),
}

/// Dispatch table plus middleware chain.
#[derive(Default)]
pub struct MessageRouter {
    table: HashMap<MessageKind, Vec<Arc<dyn MessageHandler>>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under each kind it claims, keeping each list
    /// ordered by descending priority.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        for kind in handler.kinds() {
            let list = self.table.entry(*kind).or_default();
            list.push(Arc::clone(&handler));
            list.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        }
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
        self.middlewares.sort_by_key(|m| std::cmp::Reverse(m.priority()));
    }

    /// Route one inbound envelope.
    pub async fn dispatch(
        &self,
        connection: &Arc<Connection>,
        envelope: Envelope,
    ) -> Result<HandlerResult, RouterError> {
        let Some(kind) = envelope.message_kind() else {
            return Err(RouterError::NoHandler(envelope.kind.clone()));
        };
        envelope.validate(kind)?;

        let handlers = self
            .table
            .get(&kind)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| RouterError::NoHandler(envelope.kind.clone()))?;

        let mut envelope = envelope;
        for middleware in &self.middlewares {
            envelope = middleware.before_process(envelope, connection).await;
        }

        let mut result = HandlerResult::fail("no handler accepted the message");
        for handler in handlers {
            if !handler.can_handle(&envelope) {
                continue;
            }
            result = handler.handle(connection, &envelope).await;
            if result.success {
                break;
            }
            tracing::debug!(
                kind = %kind,
                error = result.error.as_deref().unwrap_or(""),
                "handler failed, trying next"
            );
        }

        for middleware in &self.middlewares {
            middleware.after_process(&envelope, &result, connection).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
