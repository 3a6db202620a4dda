// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the control plane.

use std::path::PathBuf;

/// Resolve state directory: FW_STATE_DIR > XDG_STATE_HOME/fieldwork >
/// ~/.local/state/fieldwork.
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("FW_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("fieldwork"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/fieldwork"))
}

/// Socket path override (`FW_SOCKET`); defaults to `fieldworkd.sock`
/// inside the state dir.
pub fn socket_path() -> Option<PathBuf> {
    std::env::var("FW_SOCKET").ok().map(PathBuf::from)
}

/// `FW_SEND_FAILED_TO_WORKER=true` re-hands recoverable failures out.
pub fn send_failed_to_worker() -> Option<bool> {
    std::env::var("FW_SEND_FAILED_TO_WORKER").ok().map(|v| v == "true" || v == "1")
}

/// `FW_MAX_CONNECTIONS` override.
pub fn max_connections() -> Option<usize> {
    std::env::var("FW_MAX_CONNECTIONS").ok().and_then(|s| s.parse().ok())
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_overrides(config: &mut crate::ControlConfig) {
    if let Some(max) = max_connections() {
        config.max_connections = max;
    }
    if let Some(flag) = send_failed_to_worker() {
        config.send_failed_to_worker = flag;
    }
}
