// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound encoding and async write helpers.

use crate::envelope::Envelope;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Failures writing to the socket.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize an envelope as one newline-terminated frame.
pub fn encode_line(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write one framed envelope and flush.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<usize, WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_line(envelope)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(bytes.len())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
