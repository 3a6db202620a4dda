// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message framer over a byte stream.
//!
//! Maintains a fixed-capacity buffer per connection. Each fill runs two
//! extraction passes: complete newline-delimited lines first, then a
//! balanced-brace scan over the unterminated tail for senders that omit
//! the delimiter. Lossless: every appended byte is either returned
//! inside a frame or stays buffered for the next fill.

use thiserror::Error;

/// Framing failures. Both poison the connection: the buffer can no
/// longer make progress.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame buffer overflow: {buffered} buffered + {incoming} incoming exceeds {max}")]
    BufferOverflow { buffered: usize, incoming: usize, max: usize },

    #[error("message of {size} bytes exceeds maximum frame size {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Accumulates raw bytes and extracts JSON frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max: usize,
}

impl FrameBuffer {
    pub fn new(max: usize) -> Self {
        Self { buf: Vec::new(), max }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a chunk and extract every frame that is now complete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, CodecError> {
        if chunk.len() > self.max {
            return Err(CodecError::MessageTooLarge { size: chunk.len(), max: self.max });
        }
        if self.buf.len() + chunk.len() > self.max {
            return Err(CodecError::BufferOverflow {
                buffered: self.buf.len(),
                incoming: chunk.len(),
                max: self.max,
            });
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();

        // Pass 1: complete lines.
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if serde_json::from_str::<serde_json::Value>(line).is_ok() {
                frames.push(line.to_string());
            } else {
                // A line holding several concatenated objects still splits.
                let (scanned, _) = scan_balanced(line.as_bytes());
                if scanned.is_empty() {
                    // Not JSON at all; surface it and let the consumer reject.
                    frames.push(line.to_string());
                } else {
                    frames.extend(scanned);
                }
            }
        }

        // Pass 2: balanced objects in the unterminated tail.
        let (scanned, consumed) = scan_balanced(&self.buf);
        if consumed > 0 {
            self.buf.drain(..consumed);
        }
        frames.extend(scanned);

        Ok(frames)
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Scan for balanced `{…}` substrings that parse as JSON.
///
/// Tracks brace depth outside string literals, honoring escapes.
/// Returns the frames and how many leading bytes were consumed; bytes
/// after the last complete frame (a partial object, or a prefix with no
/// opening brace yet) are left for the caller to keep buffered.
fn scan_balanced(bytes: &[u8]) -> (Vec<String>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;

    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if start.is_some() => {
                depth -= 1;
                if depth == 0 {
                    let from = start.take().unwrap_or(i);
                    let candidate = String::from_utf8_lossy(&bytes[from..=i]);
                    if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
                        frames.push(candidate.into_owned());
                    }
                    consumed = i + 1;
                }
            }
            _ => {}
        }
    }

    (frames, consumed)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
