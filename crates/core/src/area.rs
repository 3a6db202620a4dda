// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovered namespaces (groups and projects) on the source service.

use crate::account::AccountId;
use serde::{Deserialize, Serialize};

/// Kind of a discovered namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    Group,
    Project,
}

crate::simple_display! {
    AreaType {
        Group => "group",
        Project => "project",
    }
}

/// A namespace discovered during a crawl, keyed by `full_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub full_path: String,
    pub gitlab_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AreaType,
    pub created_at_ms: u64,
}

/// Join row granting an account access to an area's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaAuthorization {
    pub account_id: AccountId,
    pub area_full_path: String,
}
