// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for grid-core operations.
//!
//! Every variant carries a stable machine-readable code (see [`Error::code`])
//! so callers can branch without parsing messages.

use thiserror::Error;

use crate::version::VersionRef;

/// All possible errors that can occur in grid-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("issue not found: #{0}")]
    IssueNotFound(i64),

    #[error("version not found: #{0}")]
    VersionNotFound(i64),

    #[error("project not found: #{0}")]
    ProjectNotFound(i64),

    #[error("subscription session not found or expired: {0}")]
    SessionNotFound(String),

    #[error("invalid hierarchy: {child} cannot be placed under {parent}\n  hint: allowed parents for {child}: {allowed}")]
    InvalidHierarchy {
        child: String,
        parent: String,
        allowed: String,
    },

    #[error("hierarchy cycle: #{parent_id} is a descendant of #{issue_id} and cannot become its parent")]
    HierarchyCycle { issue_id: i64, parent_id: i64 },

    #[error("version #{version_id} is not assignable to issue #{issue_id}\n  hint: {} versions are assignable", .assignable.len())]
    VersionNotAssignable {
        issue_id: i64,
        version_id: i64,
        /// Full assignable set, returned as diagnostic detail.
        assignable: Vec<VersionRef>,
    },

    #[error("version '{name}' is {status} and does not accept new assignments")]
    VersionLocked { name: String, status: String },

    #[error("stale lock on issue #{resource_id}: current {current_version}, attempted {attempted_version}\n  hint: refetch the issue and retry with the new lock value")]
    ConcurrencyConflict {
        resource_id: i64,
        current_version: i64,
        attempted_version: i64,
    },

    #[error("workflow violation on issue #{issue_id}: {from} -> {to} is not allowed for role {role}{detail}")]
    WorkflowViolation {
        issue_id: i64,
        from: String,
        to: String,
        role: String,
        detail: String,
    },

    #[error("{0}")]
    ValidationFailed(String),

    #[error("batch too large: {requested} issues requested (limit {limit})")]
    BatchTooLarge { requested: usize, limit: usize },

    #[error("invalid tracker: '{0}'\n  hint: valid trackers are: epic, feature, user_story, task, test, bug")]
    InvalidTracker(String),

    #[error("invalid status: '{0}'\n  hint: valid statuses are: new, ready, in_progress, review, testing, resolved, closed")]
    InvalidStatus(String),

    #[error("invalid priority: '{0}'\n  hint: valid priorities are: low, normal, high, urgent, immediate")]
    InvalidPriority(String),

    #[error("invalid role: '{0}'\n  hint: valid roles are: manager, developer, reporter")]
    InvalidRole(String),

    #[error("invalid relation: '{0}'\n  hint: valid relations are: blocks, relates")]
    InvalidRelation(String),

    #[error("invalid version status: '{0}'\n  hint: valid statuses are: open, locked, closed")]
    InvalidVersionStatus(String),

    #[error("invalid version sharing: '{0}'\n  hint: valid sharing modes are: none, descendants, system")]
    InvalidVersionSharing(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid change type: '{0}'")]
    InvalidChangeType(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error [{correlation_id}]")]
    Internal { correlation_id: String },
}

impl Error {
    /// Stable machine-readable code for the error taxonomy.
    ///
    /// Batch results and wire responses report this code; messages are for
    /// humans and may change.
    pub fn code(&self) -> &'static str {
        match self {
            Error::IssueNotFound(_)
            | Error::VersionNotFound(_)
            | Error::ProjectNotFound(_)
            | Error::SessionNotFound(_) => "not_found",
            Error::InvalidHierarchy { .. } | Error::HierarchyCycle { .. } => "invalid_hierarchy",
            Error::VersionNotAssignable { .. } => "version_not_assignable",
            Error::VersionLocked { .. } => "version_locked",
            Error::ConcurrencyConflict { .. } => "concurrency_conflict",
            Error::WorkflowViolation { .. } => "workflow_violation",
            Error::BatchTooLarge { .. } => "batch_too_large",
            Error::ValidationFailed(_)
            | Error::InvalidTracker(_)
            | Error::InvalidStatus(_)
            | Error::InvalidPriority(_)
            | Error::InvalidRole(_)
            | Error::InvalidRelation(_)
            | Error::InvalidVersionStatus(_)
            | Error::InvalidVersionSharing(_)
            | Error::InvalidCursor(_)
            | Error::InvalidChangeType(_) => "validation_failed",
            Error::CorruptedData(_)
            | Error::Database(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal { .. } => "internal_error",
        }
    }
}

/// A specialized Result type for grid-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
