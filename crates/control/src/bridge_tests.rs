// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fw_core::JobId;

#[tokio::test]
async fn observers_receive_published_events() {
    let bridge = AdminBridge::new();
    let mut rx = bridge.subscribe();

    bridge.publish(AdminEvent::ConnectionAccepted { connection_id: 1 });

    let event = rx.recv().await.unwrap();
    assert_eq!(event, AdminEvent::ConnectionAccepted { connection_id: 1 });
}

#[tokio::test]
async fn publish_without_observers_does_not_block() {
    let bridge = AdminBridge::new();
    bridge.publish(AdminEvent::JobCompleted { job_id: JobId::from_string("job-1"), success: true });
    assert_eq!(bridge.observer_count(), 0);
}

#[tokio::test]
async fn observers_join_and_leave_independently() {
    let bridge = AdminBridge::new();
    let mut a = bridge.subscribe();
    let b = bridge.subscribe();
    assert_eq!(bridge.observer_count(), 2);

    drop(b);
    bridge.publish(AdminEvent::ConnectionRemoved { connection_id: 3, reason: "stale".into() });

    assert!(a.recv().await.is_ok());
    assert_eq!(bridge.observer_count(), 1);
}

#[tokio::test]
async fn lagging_observer_misses_events_but_recovers() {
    let bridge = AdminBridge::with_capacity(2);
    let mut rx = bridge.subscribe();

    for i in 0..5 {
        bridge.publish(AdminEvent::ConnectionAccepted { connection_id: i });
    }

    // The first recv reports the lag, later events still arrive.
    assert!(matches!(
        rx.recv().await,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
    ));
    assert!(rx.recv().await.is_ok());
}
