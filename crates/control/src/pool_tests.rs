// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fw_core::FakeClock;
use fw_wire::MessageKind;
use serde_json::json;
use std::time::Duration;
use tokio::io::AsyncReadExt;

fn small_config() -> ControlConfig {
    ControlConfig {
        max_connections: 2,
        heartbeat_timeout_ms: 30_000,
        connection_timeout_ms: 120_000,
        message_timeout_ms: 200,
        ..ControlConfig::default()
    }
}

fn pool_with_clock(config: ControlConfig) -> (ConnectionPool<FakeClock>, AdminBridge, FakeClock) {
    let bridge = AdminBridge::new();
    let clock = FakeClock::new();
    (ConnectionPool::new(config, bridge.clone(), clock.clone()), bridge, clock)
}

fn duplex_writer() -> (BoxedWriter, tokio::io::DuplexStream) {
    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    (Box::new(ours), theirs)
}

#[tokio::test]
async fn admit_assigns_monotonic_ids() {
    let (pool, _bridge, _clock) = pool_with_clock(small_config());

    let (w1, _p1) = duplex_writer();
    let (w2, _p2) = duplex_writer();
    let a = pool.admit(w1).unwrap();
    let b = pool.admit(w2).unwrap();

    assert!(b.id() > a.id());
    assert_eq!(pool.len(), 2);
}

#[tokio::test]
async fn admit_over_capacity_rejects_and_fires_event() {
    let (pool, bridge, _clock) = pool_with_clock(small_config());
    let mut events = bridge.subscribe();

    let (w1, _p1) = duplex_writer();
    let (w2, _p2) = duplex_writer();
    let (w3, _p3) = duplex_writer();
    pool.admit(w1).unwrap();
    pool.admit(w2).unwrap();
    assert!(pool.admit(w3).is_none());
    assert_eq!(pool.len(), 2);

    let mut rejected = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AdminEvent::ConnectionRejected { .. }) {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 1);
}

#[tokio::test]
async fn cleanup_removes_errored_connections() {
    let (pool, _bridge, _clock) = pool_with_clock(small_config());
    let (w1, _p1) = duplex_writer();
    let conn = pool.admit(w1).unwrap();
    conn.set_state(crate::connection::ConnectionState::Error);

    let removed = pool.cleanup().await;
    assert_eq!(removed, 1);
    assert!(pool.is_empty());
}

#[tokio::test]
async fn cleanup_removes_heartbeat_silent_connections() {
    let (pool, _bridge, clock) = pool_with_clock(small_config());
    let (w1, _p1) = duplex_writer();
    let conn = pool.admit(w1).unwrap();

    // Activity continues, heartbeats do not.
    clock.advance(Duration::from_secs(31));
    conn.feed(b"{\"type\":\"job_request\",\"timestamp\":\"t\",\"data\":{}}\n", clock.epoch_ms())
        .unwrap();

    let removed = pool.cleanup().await;
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn cleanup_keeps_healthy_connections() {
    let (pool, _bridge, clock) = pool_with_clock(small_config());
    let (w1, _p1) = duplex_writer();
    let conn = pool.admit(w1).unwrap();

    clock.advance(Duration::from_secs(5));
    conn.note_heartbeat(clock.epoch_ms(), false);

    assert_eq!(pool.cleanup().await, 0);
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn broadcast_counts_failures_without_aborting() {
    let (pool, _bridge, _clock) = pool_with_clock(ControlConfig {
        max_connections: 4,
        ..small_config()
    });
    let (w1, mut p1) = duplex_writer();
    let (w2, _p2) = duplex_writer();
    let healthy = pool.admit(w1).unwrap();
    let broken = pool.admit(w2).unwrap();
    healthy.note_heartbeat(1, false);
    broken.disconnect("test", Duration::from_millis(50)).await;

    let envelope = Envelope::new(MessageKind::Shutdown, None, json!({}));
    let outcome = pool.broadcast_all(&envelope).await;
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.failed, 1);

    let mut buf = vec![0u8; 16];
    let n = p1.read(&mut buf).await.unwrap();
    assert!(n > 0);
}

#[tokio::test]
async fn broadcast_active_skips_idle() {
    let (pool, _bridge, _clock) = pool_with_clock(ControlConfig {
        max_connections: 4,
        ..small_config()
    });
    let (w1, _p1) = duplex_writer();
    let (w2, _p2) = duplex_writer();
    let active = pool.admit(w1).unwrap();
    let idle = pool.admit(w2).unwrap();
    active.feed(b"{\"type\":\"heartbeat\",\"timestamp\":\"t\",\"data\":{}}\n", 1).unwrap();
    idle.feed(b"{\"type\":\"heartbeat\",\"timestamp\":\"t\",\"data\":{}}\n", 1).unwrap();
    idle.note_heartbeat(2, true);

    let envelope = Envelope::new(MessageKind::JobResponse, None, json!({ "jobs": [] }));
    let outcome = pool.broadcast_active(&envelope).await;
    assert_eq!(outcome.attempted, 1);
}

#[tokio::test]
async fn shutdown_drains_the_pool() {
    let (pool, _bridge, _clock) = pool_with_clock(small_config());
    let (w1, _p1) = duplex_writer();
    let (w2, _p2) = duplex_writer();
    pool.admit(w1).unwrap();
    pool.admit(w2).unwrap();

    pool.shutdown("going down").await;
    assert!(pool.is_empty());
}
