// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the control plane and the crawler.
//!
//! Wire format: newline-delimited JSON envelopes; receivers also accept
//! back-to-back JSON objects without a delimiter via balanced-brace
//! scanning (see [`codec::FrameBuffer`]).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod envelope;
mod payload;
mod wire;

pub use codec::{CodecError, FrameBuffer};
pub use envelope::{Envelope, EnvelopeError, MessageKind};
pub use payload::{
    HeartbeatData, JobCompletedData, JobDescriptor, JobFailedData, JobProgressData,
    JobRequestData, JobResponseData, JobStartedData, JobsDiscoveredData, ShutdownData, Stage,
    SystemStatus, TokenRefreshRequestData, TokenRefreshResponseData,
};
pub use wire::{encode_line, write_envelope, WireError};
