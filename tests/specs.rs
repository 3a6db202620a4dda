//! Workspace-level pipeline specs.
//!
//! Each spec drives the real control plane and the real crawler over a
//! Unix socket in a temp dir, with only the GitLab upstream faked.

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/pipeline"]
mod pipeline {
    mod capacity;
    mod discovery_fanout;
    mod framing;
    mod missing_params;
    mod rate_limit;
    mod token_refresh;
}
