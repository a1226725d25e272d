// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Version propagation entry points.
//!
//! Thin orchestration over [`crate::dates`]: every "assign a version" path
//! (manual drag to a grid cell, bulk assignment, automation) comes through
//! here. The fan-out is strictly downward — dragging a Feature reaches its
//! UserStories and their leaves; dragging a bare UserStory reaches only its
//! own children and never its siblings.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::dates::{self, CascadeOptions, VersionChangeOutcome};
use crate::db::Database;
use crate::error::Result;
use crate::issue::Actor;
use crate::version::Version;

/// Request options for a version assignment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AssignVersionRequest {
    /// Optimistic-lock value the caller last saw, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_lock_version: Option<i64>,
    #[serde(flatten)]
    pub cascade: CascadeOptions,
}

/// Assign `version_id` (or clear, for `None`) to an issue and cascade.
///
/// Existence is checked here; assignability, the locked-version policy, and
/// the date/cascade mechanics live in [`dates::change_version_with_dates`].
pub fn assign_version(
    db: &Database,
    issue_id: i64,
    version_id: Option<i64>,
    req: AssignVersionRequest,
    actor: &Actor,
    config: &EngineConfig,
) -> Result<VersionChangeOutcome> {
    let version: Option<Version> = match version_id {
        Some(id) => Some(db.get_version(id)?),
        None => None,
    };
    dates::change_version_with_dates(
        db,
        issue_id,
        version.as_ref(),
        req.expected_lock_version,
        req.cascade,
        actor,
        config,
    )
}

/// Kind of divergence between a child's version and its parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Parent has a version, child has none.
    Missing,
    /// Child carries a different version than the parent.
    Mismatch,
}

/// One advisory finding from the consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyFinding {
    pub child_id: i64,
    pub parent_id: i64,
    pub kind: DivergenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_version_id: Option<i64>,
    pub parent_version_id: i64,
    /// A pinned child diverges on purpose.
    pub child_pinned: bool,
}

/// Aggregate counters for the consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsistencyStats {
    pub total_issues: usize,
    pub version_assigned: usize,
    pub missing: usize,
    pub mismatched: usize,
}

/// Advisory report of parent/child version divergence across a project.
///
/// Divergence is legal state ("US2 has a different version than its
/// Feature"), so this reports, it never fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub findings: Vec<ConsistencyFinding>,
    pub stats: ConsistencyStats,
}

/// Walk every live parent/child pair in a project and report version
/// divergences.
pub fn check_version_consistency(db: &Database, project_id: i64) -> Result<ConsistencyReport> {
    let issues = db.list_issues(project_id, false)?;
    let mut stats = ConsistencyStats {
        total_issues: issues.len(),
        ..ConsistencyStats::default()
    };
    let mut findings = Vec::new();

    for issue in &issues {
        if issue.version_id.is_some() {
            stats.version_assigned += 1;
        }
        let Some(parent_id) = issue.parent_id else {
            continue;
        };
        let Some(parent) = issues.iter().find(|i| i.id == parent_id) else {
            continue;
        };
        let Some(parent_version_id) = parent.version_id else {
            continue;
        };
        match issue.version_id {
            None => {
                stats.missing += 1;
                findings.push(ConsistencyFinding {
                    child_id: issue.id,
                    parent_id,
                    kind: DivergenceKind::Missing,
                    child_version_id: None,
                    parent_version_id,
                    child_pinned: issue.version_pinned,
                });
            }
            Some(child_version_id) if child_version_id != parent_version_id => {
                stats.mismatched += 1;
                findings.push(ConsistencyFinding {
                    child_id: issue.id,
                    parent_id,
                    kind: DivergenceKind::Mismatch,
                    child_version_id: Some(child_version_id),
                    parent_version_id,
                    child_pinned: issue.version_pinned,
                });
            }
            Some(_) => {}
        }
    }

    Ok(ConsistencyReport {
        consistent: findings.is_empty(),
        findings,
        stats,
    })
}

#[cfg(test)]
#[path = "propagation_tests.rs"]
mod tests;
