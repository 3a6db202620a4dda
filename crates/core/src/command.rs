// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl commands and their GitLab endpoint tables.
//!
//! Commands are the unit of dispatch on both sides of the socket: the
//! control plane stores them on job rows, the crawler maps them to
//! endpoint templates. Path parameters in templates start with `:`.

use serde::{Deserialize, Serialize};

/// A crawl command carried on a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    GroupProjectDiscovery,
    FetchProjects,
    FetchGroups,
    FetchUsers,
    FetchIssues,
    FetchMergeRequests,
    FetchCommits,
    FetchBranches,
    FetchPipelines,
    FetchReleases,
    FetchMilestones,
    FetchEpics,
    FetchJobs,
    FetchEvents,
    FetchIssueNotes,
    TestType,
}

crate::simple_display! {
    Command {
        GroupProjectDiscovery => "GROUP_PROJECT_DISCOVERY",
        FetchProjects => "FETCH_PROJECTS",
        FetchGroups => "FETCH_GROUPS",
        FetchUsers => "FETCH_USERS",
        FetchIssues => "FETCH_ISSUES",
        FetchMergeRequests => "FETCH_MERGE_REQUESTS",
        FetchCommits => "FETCH_COMMITS",
        FetchBranches => "FETCH_BRANCHES",
        FetchPipelines => "FETCH_PIPELINES",
        FetchReleases => "FETCH_RELEASES",
        FetchMilestones => "FETCH_MILESTONES",
        FetchEpics => "FETCH_EPICS",
        FetchJobs => "FETCH_JOBS",
        FetchEvents => "FETCH_EVENTS",
        FetchIssueNotes => "FETCH_ISSUE_NOTES",
        TestType => "TEST_TYPE",
    }
}

impl Command {
    /// REST endpoint templates for this command.
    ///
    /// Multi-template commands (milestones, events) cover both the
    /// project-scoped and group-scoped variants of the same resource.
    pub fn endpoint_templates(&self) -> &'static [&'static str] {
        match self {
            Command::GroupProjectDiscovery => &["/api/v4/groups", "/api/v4/projects"],
            Command::FetchProjects => &["/api/v4/projects/:id"],
            Command::FetchGroups => &["/api/v4/groups/:id"],
            Command::FetchUsers => &["/api/v4/users"],
            Command::FetchIssues => &["/api/v4/projects/:id/issues"],
            Command::FetchMergeRequests => &["/api/v4/projects/:id/merge_requests"],
            Command::FetchCommits => &["/api/v4/projects/:id/repository/commits"],
            Command::FetchBranches => &["/api/v4/projects/:id/repository/branches"],
            Command::FetchPipelines => &["/api/v4/projects/:id/pipelines"],
            Command::FetchReleases => &["/api/v4/projects/:id/releases"],
            Command::FetchMilestones => {
                &["/api/v4/projects/:id/milestones", "/api/v4/groups/:id/milestones"]
            }
            Command::FetchEpics => &["/api/v4/groups/:id/epics"],
            Command::FetchJobs => &["/api/v4/projects/:id/pipelines/:pipeline_id/jobs"],
            Command::FetchEvents => &["/api/v4/projects/:id/events", "/api/v4/groups/:id/events"],
            Command::FetchIssueNotes => &["/api/v4/projects/:id/issues/:issue_iid/notes"],
            Command::TestType => &[],
        }
    }

    /// Entity type used in progress counters and storage keys.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Command::GroupProjectDiscovery => "areas",
            Command::FetchProjects => "projects",
            Command::FetchGroups => "groups",
            Command::FetchUsers => "users",
            Command::FetchIssues => "issues",
            Command::FetchMergeRequests => "merge_requests",
            Command::FetchCommits => "commits",
            Command::FetchBranches => "branches",
            Command::FetchPipelines => "pipelines",
            Command::FetchReleases => "releases",
            Command::FetchMilestones => "milestones",
            Command::FetchEpics => "epics",
            Command::FetchJobs => "jobs",
            Command::FetchEvents => "events",
            Command::FetchIssueNotes => "issue_notes",
            Command::TestType => "test",
        }
    }

    /// Per-data-type commands spawned for every discovered group or project.
    ///
    /// The set is deduplicated at the definition; groups additionally get
    /// epics, which only exist at group level in the GitLab API.
    pub fn sub_fanout(kind: DiscoveredKind) -> &'static [Command] {
        const COMMON: &[Command] = &[
            Command::FetchIssues,
            Command::FetchMergeRequests,
            Command::FetchCommits,
            Command::FetchBranches,
            Command::FetchPipelines,
            Command::FetchMilestones,
            Command::FetchJobs,
            Command::FetchIssueNotes,
        ];
        const GROUP: &[Command] = &[
            Command::FetchIssues,
            Command::FetchMergeRequests,
            Command::FetchCommits,
            Command::FetchBranches,
            Command::FetchPipelines,
            Command::FetchMilestones,
            Command::FetchJobs,
            Command::FetchIssueNotes,
            Command::FetchEpics,
        ];
        match kind {
            DiscoveredKind::CrawlGroup => GROUP,
            DiscoveredKind::CrawlProject => COMMON,
            _ => &[],
        }
    }
}

/// Kind of a discovered entity in a `jobs_discovered` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveredKind {
    DiscoverNamespaces,
    CrawlGroup,
    CrawlProject,
    CrawlUser,
}

crate::simple_display! {
    DiscoveredKind {
        DiscoverNamespaces => "discover_namespaces",
        CrawlGroup => "crawl_group",
        CrawlProject => "crawl_project",
        CrawlUser => "crawl_user",
    }
}

impl DiscoveredKind {
    /// Command the fan-out creates for this kind.
    pub fn command(&self) -> Command {
        match self {
            DiscoveredKind::DiscoverNamespaces => Command::GroupProjectDiscovery,
            DiscoveredKind::CrawlGroup => Command::FetchGroups,
            DiscoveredKind::CrawlProject => Command::FetchProjects,
            DiscoveredKind::CrawlUser => Command::FetchUsers,
        }
    }

    /// Scheduling rank for the post-fan-out nudge: lower runs first.
    pub fn priority_rank(&self) -> u8 {
        match self {
            DiscoveredKind::CrawlUser => 0,
            DiscoveredKind::CrawlGroup => 1,
            DiscoveredKind::CrawlProject => 2,
            DiscoveredKind::DiscoverNamespaces => 3,
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
