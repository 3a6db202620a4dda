//! Two JSON envelopes in one chunk with no delimiter both route.

use crate::prelude::*;
use fw_control::ControlConfig;
use fw_wire::{Envelope, FrameBuffer, MessageKind};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

async fn read_envelope(stream: &mut UnixStream) -> Envelope {
    let mut frames = FrameBuffer::new(1024 * 1024);
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "server closed unexpectedly");
        if let Some(frame) = frames.push(&buf[..n]).unwrap().first() {
            return Envelope::parse(frame).unwrap();
        }
    }
}

#[tokio::test]
async fn back_to_back_envelopes_without_newline() {
    let pipeline = start_pipeline(
        FakeUpstream::new(),
        PipelineOptions { crawler: false, ..PipelineOptions::default() },
    )
    .await;

    let mut raw = UnixStream::connect(pipeline.socket()).await.unwrap();
    let chunk = format!(
        "{}{}",
        json!({
            "type": "heartbeat",
            "timestamp": "t",
            "data": { "activeJobs": 0, "totalProcessed": 0, "systemStatus": "idle" },
        }),
        json!({ "type": "job_request", "timestamp": "t", "data": {} }),
    );
    raw.write_all(chunk.as_bytes()).await.unwrap();

    // Message two produced its reply, so both arrived, in order.
    let reply = read_envelope(&mut raw).await;
    assert_eq!(reply.message_kind(), Some(MessageKind::JobResponse));

    let connections = pipeline.server.pool.snapshot();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].stats().messages_in, 2);
    // The first message registered as a heartbeat.
    assert!(connections[0].last_heartbeat_ms() > 0);

    pipeline.cancel.cancel();
}

#[tokio::test]
async fn oversized_frame_poisons_only_that_connection() {
    let pipeline = start_pipeline(
        FakeUpstream::new(),
        PipelineOptions {
            control: ControlConfig { buffer_size: 256, ..ControlConfig::default() },
            crawler: false,
            ..PipelineOptions::default()
        },
    )
    .await;

    let mut big = UnixStream::connect(pipeline.socket()).await.unwrap();
    big.write_all(&vec![b'{'; 512]).await.unwrap();

    // The offender is removed from the pool and closed.
    assert!(wait_for(|| pipeline.server.pool.is_empty()).await);
    let mut buf = [0u8; 16];
    let _ = big.read(&mut buf).await;

    // ...while a fresh connection still works.
    let mut ok = UnixStream::connect(pipeline.socket()).await.unwrap();
    ok.write_all(b"{\"type\":\"job_request\",\"timestamp\":\"t\",\"data\":{}}\n")
        .await
        .unwrap();
    let reply = read_envelope(&mut ok).await;
    assert_eq!(reply.message_kind(), Some(MessageKind::JobResponse));

    pipeline.cancel.cancel();
}
