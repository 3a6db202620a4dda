// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fw-control: the Fieldwork control plane.
//!
//! Owns the job store and OAuth credentials, accepts crawler
//! connections over a local socket, routes protocol messages, enforces
//! the job state machine, fans discovery results out into collection
//! jobs, and republishes lifecycle events to admin observers.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod env;
pub mod handlers;
pub mod pool;
pub mod router;
pub mod server;
pub mod service;
pub mod tokens;

pub use bridge::{AdminBridge, AdminEvent};
pub use config::ControlConfig;
pub use connection::{Connection, ConnectionError, ConnectionState, ConnectionStats};
pub use pool::ConnectionPool;
pub use router::{HandlerResult, MessageHandler, MessageRouter, Middleware, RouterError};
pub use server::Server;
pub use service::{JobService, ServiceError};
pub use tokens::{RefreshError, RefreshedToken, TokenCoordinator, TokenRefresher};
