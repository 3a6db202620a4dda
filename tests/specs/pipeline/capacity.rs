//! The pool cap is enforced with an immediate destroy and one event.

use crate::prelude::*;
use fw_control::{AdminEvent, ControlConfig};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

#[tokio::test]
async fn third_connection_is_destroyed_when_cap_is_two() {
    let pipeline = start_pipeline(
        FakeUpstream::new(),
        PipelineOptions {
            control: ControlConfig { max_connections: 2, ..ControlConfig::default() },
            crawler: false,
            ..PipelineOptions::default()
        },
    )
    .await;
    let mut events = pipeline.server.bridge.subscribe();

    let _first = UnixStream::connect(pipeline.socket()).await.unwrap();
    let _second = UnixStream::connect(pipeline.socket()).await.unwrap();
    assert!(wait_for(|| pipeline.server.pool.len() == 2).await);

    let mut third = UnixStream::connect(pipeline.socket()).await.unwrap();
    let mut buf = [0u8; 8];
    // Immediate destroy: EOF without any payload.
    assert_eq!(third.read(&mut buf).await.unwrap(), 0);

    // The pool never exceeded its cap and fired exactly one rejection.
    assert_eq!(pipeline.server.pool.len(), 2);
    let mut rejected = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AdminEvent::ConnectionRejected { .. }) {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 1);

    pipeline.cancel.cancel();
}
