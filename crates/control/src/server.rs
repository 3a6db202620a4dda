// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server assembly: store + pool + router + handlers, and the accept
//! and read loops that drive them.

use crate::bridge::AdminBridge;
use crate::config::ControlConfig;
use crate::connection::Connection;
use crate::discovery::DiscoveryFanout;
use crate::handlers::{
    HeartbeatHandler, JobLifecycleHandler, JobRequestHandler, JobsDiscoveredHandler,
    TokenRefreshHandler,
};
use crate::pool::ConnectionPool;
use crate::router::{MessageRouter, RouterError};
use crate::service::JobService;
use crate::tokens::{TokenCoordinator, TokenRefresher};
use fw_core::{Clock, Provider};
use fw_storage::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

const READ_BUF_SIZE: usize = 16 * 1024;

/// The assembled control plane.
pub struct Server<C: Clock + 'static> {
    pub store: Arc<Store>,
    pub bridge: AdminBridge,
    pub pool: Arc<ConnectionPool<C>>,
    pub router: Arc<MessageRouter>,
    pub service: Arc<JobService<C>>,
    config: ControlConfig,
    clock: C,
}

impl<C: Clock + 'static> Server<C> {
    /// Wire every component together and register the built-in handlers.
    pub fn new(
        store: Arc<Store>,
        config: ControlConfig,
        clock: C,
        refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
    ) -> Arc<Self> {
        let bridge = AdminBridge::new();
        let pool = Arc::new(ConnectionPool::new(config.clone(), bridge.clone(), clock.clone()));
        let service =
            Arc::new(JobService::new(Arc::clone(&store), bridge.clone(), &config, clock.clone()));
        let fanout =
            Arc::new(DiscoveryFanout::new(Arc::clone(&store), bridge.clone(), clock.clone()));
        let mut coordinator =
            TokenCoordinator::new(Arc::clone(&store), bridge.clone(), clock.clone());
        for (provider, refresher) in refreshers {
            coordinator.register_refresher(provider, refresher);
        }
        let coordinator = Arc::new(coordinator);

        let mut router = MessageRouter::new();
        router.register(Arc::new(HeartbeatHandler { bridge: bridge.clone(), clock: clock.clone() }));
        router.register(Arc::new(JobRequestHandler { service: Arc::clone(&service) }));
        router.register(Arc::new(JobLifecycleHandler { service: Arc::clone(&service) }));
        router.register(Arc::new(JobsDiscoveredHandler { fanout }));
        router.register(Arc::new(TokenRefreshHandler { coordinator }));

        Arc::new(Self {
            store,
            bridge,
            pool,
            router: Arc::new(router),
            service,
            config,
            clock,
        })
    }

    /// Accept connections until cancelled, then drain gracefully.
    pub async fn run(self: Arc<Self>, listener: UnixListener, cancel: CancellationToken) {
        let cleanup = {
            let pool = Arc::clone(&self.pool);
            let cancel = cancel.clone();
            let period = self.config.cleanup_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let removed = pool.cleanup().await;
                            if removed > 0 {
                                tracing::info!(removed, "cleanup removed connections");
                            }
                        }
                    }
                }
            })
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let (reader, writer) = stream.into_split();
                            // Over capacity both halves drop here: immediate destroy.
                            if let Some(connection) = self.pool.admit(Box::new(writer)) {
                                let server = Arc::clone(&self);
                                tokio::spawn(async move {
                                    server.drive_connection(connection, reader).await;
                                });
                            }
                        }
                        Err(err) => tracing::error!(error = %err, "accept error"),
                    }
                }
            }
        }

        cleanup.abort();
        self.pool.shutdown("control plane shutting down").await;
        if let Err(err) = self.store.checkpoint() {
            tracing::error!(error = %err, "final checkpoint failed");
        }
    }

    /// Read loop for one connection; exits on EOF or framing failure.
    pub async fn drive_connection<R>(&self, connection: Arc<Connection>, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    self.pool.remove(connection.id(), "peer closed");
                    connection
                        .disconnect("peer closed", self.config.message_timeout())
                        .await;
                    return;
                }
                Ok(n) => n,
                Err(err) => {
                    tracing::warn!(connection = connection.id(), error = %err, "read error");
                    self.pool.remove(connection.id(), "read error");
                    connection.disconnect("read error", self.config.message_timeout()).await;
                    return;
                }
            };

            let envelopes = match connection.feed(&buf[..n], self.clock.epoch_ms()) {
                Ok(envelopes) => envelopes,
                Err(err) => {
                    // Framing failures poison the connection; the crawler reconnects.
                    tracing::warn!(connection = connection.id(), error = %err, "framing failure");
                    self.pool.remove(connection.id(), "framing failure");
                    connection.disconnect("framing failure", self.config.message_timeout()).await;
                    return;
                }
            };

            for envelope in envelopes {
                match self.router.dispatch(&connection, envelope).await {
                    Ok(result) if !result.success => {
                        tracing::warn!(
                            connection = connection.id(),
                            error = result.error.as_deref().unwrap_or(""),
                            "message handling failed"
                        );
                    }
                    Ok(_) => {}
                    Err(RouterError::NoHandler(kind)) => {
                        tracing::warn!(connection = connection.id(), kind, "no handler; dropped");
                    }
                    Err(RouterError::Validation(err)) => {
                        tracing::warn!(connection = connection.id(), error = %err, "invalid envelope");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
