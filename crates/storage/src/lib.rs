// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fw-storage: durable state for the control plane.
//!
//! Event-sourced: every mutation is a [`StoreEvent`] appended to a WAL
//! and applied to an in-memory [`MaterializedState`]. Recovery loads the
//! latest snapshot and replays the WAL tail. A repository call holds one
//! lock for validate-apply-append, which is what gives hand-out dedup
//! and all-or-nothing discovery batches.

mod event;
mod snapshot;
mod state;
mod store;
mod wal;

pub use event::StoreEvent;
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use store::{JobQuery, Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};
