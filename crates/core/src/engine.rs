// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The mutation engine: every write to the grid goes through here.
//!
//! Single-issue operations fail whole on any error. Batch operations process
//! each issue independently and partition the result into succeeded and
//! failed — one issue's conflict or validation failure never aborts the
//! batch. Only a cap violation or a missing required parameter rejects a
//! batch before work begins. Every successful write publishes a change
//! event; every batch records one history row after its last issue.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::dates::{self, CascadeOptions, SkippedChild, VersionChangeOutcome};
use crate::db::Database;
use crate::distributor::{ChangeDistributor, PollPage, SessionInfo};
use crate::error::{Error, Result};
use crate::events::{ChangeEvent, ChangeType, Cursor, EventRecord, EventStore, ResourceType};
use crate::guard;
use crate::hierarchy;
use crate::issue::{Actor, Issue, NewIssue, Priority, Relation, Status, Tracker};
use crate::propagation::{self, AssignVersionRequest, ConsistencyReport};
use crate::version::{LockedVersionPolicy, Version};
use crate::workflow;

/// A drag-and-drop move: the target grid cell, given as both coordinates.
/// `None` means the cell has no epic row / no version column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_lock_version: Option<i64>,
    pub propagate_to_children: bool,
    pub force_update: bool,
    pub strict: bool,
}

impl MoveRequest {
    /// A move to the given cell with default cascade behavior.
    pub fn to_cell(target_parent_id: Option<i64>, target_version_id: Option<i64>) -> Self {
        MoveRequest {
            target_parent_id,
            target_version_id,
            expected_lock_version: None,
            propagate_to_children: true,
            force_update: false,
            strict: false,
        }
    }

    /// Sets the expected lock value (builder pattern).
    pub fn with_expected_lock(mut self, lock_version: i64) -> Self {
        self.expected_lock_version = Some(lock_version);
        self
    }
}

/// One changed field, old and new values, for observers and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

/// Downward cascade result attached to a move or version assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationSummary {
    pub updated_children: Vec<Issue>,
    pub skipped_children: Vec<SkippedChild>,
}

/// Result of a drag-and-drop move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub issue: Issue,
    pub changes: Vec<FieldDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation: Option<PropagationSummary>,
    pub warnings: Vec<String>,
}

/// Field edits for a single issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub clear_assignee: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_ratio: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_lock_version: Option<i64>,
}

/// One issue in a batch request, with an optional per-issue lock value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_lock_version: Option<i64>,
}

impl From<i64> for BatchItem {
    fn from(id: i64) -> Self {
        BatchItem {
            id,
            expected_lock_version: None,
        }
    }
}

/// Fields a bulk update may set, mirroring the single-edit permit list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdateFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl BatchUpdateFields {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assignee.is_none()
            && self.version_id.is_none()
            && self.priority.is_none()
    }
}

/// One failed issue in a batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: i64,
    /// Stable machine-readable code from the error taxonomy.
    pub code: String,
    pub message: String,
}

impl BatchFailure {
    fn from_error(id: i64, err: &Error) -> Self {
        BatchFailure {
            id,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Aggregate counts and timing for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub elapsed_ms: i64,
}

/// Partitioned batch result: succeeded and failed, never all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<Issue>,
    pub failed: Vec<BatchFailure>,
    pub summary: BatchSummary,
}

/// One workflow violation collected by a batch status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowViolationDetail {
    pub issue_id: i64,
    pub from: Status,
    pub to: Status,
    pub reason: String,
}

/// Result of a batch status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransitionOutcome {
    #[serde(flatten)]
    pub batch: BatchOutcome,
    pub workflow_violations: Vec<WorkflowViolationDetail>,
}

/// Result of a batch version assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionAssignOutcome {
    #[serde(flatten)]
    pub batch: BatchOutcome,
    /// Descendants updated through the cascade, across the whole batch.
    pub propagated: Vec<Issue>,
    /// Descendants skipped by the manual-pin rule, across the whole batch.
    pub skipped_children: Vec<SkippedChild>,
    pub warnings: Vec<String>,
}

/// One (issue, priority) pair for a bulk priority adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityAdjustment {
    pub id: i64,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_lock_version: Option<i64>,
}

/// Result of a batch soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftDeleteOutcome {
    #[serde(flatten)]
    pub batch: BatchOutcome,
    /// Children deleted by the cascade (they had no outside relations).
    pub cascade_deleted: Vec<i64>,
    /// Relations that kept a child alive, reported for the caller.
    pub preserved_relations: Vec<Relation>,
}

/// Audit row recorded once per batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchHistoryEntry {
    pub id: i64,
    pub project_id: i64,
    pub operation: String,
    pub actor: String,
    pub affected_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub elapsed_ms: i64,
    pub created_at: chrono::DateTime<Utc>,
}

/// Filter for the batch-history query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        HistoryFilter {
            operation: None,
            actor: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Counters from one housekeeping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Housekeeping {
    pub pruned_events: usize,
    pub expired_sessions: usize,
}

/// The engine owning the database, the change distributor, and the
/// configured policies.
pub struct MutationEngine {
    db: Database,
    config: EngineConfig,
    distributor: ChangeDistributor,
}

impl MutationEngine {
    /// Creates an engine over an open database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let distributor = ChangeDistributor::new(Duration::minutes(config.session_ttl_minutes));
        MutationEngine {
            db,
            config,
            distributor,
        }
    }

    /// Direct access to persistence, for read paths the engine does not wrap.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn emit(
        &self,
        project_id: i64,
        change_type: ChangeType,
        resource_id: i64,
        lock_version: Option<i64>,
        actor: &Actor,
        payload: serde_json::Value,
    ) -> Result<ChangeEvent> {
        self.distributor.publish(
            &self.db,
            project_id,
            EventRecord {
                change_type,
                resource_type: ResourceType::Issue,
                resource_id,
                lock_version,
                actor: actor.name.clone(),
                payload,
            },
        )
    }

    fn emit_issue(&self, change_type: ChangeType, issue: &Issue, actor: &Actor) -> Result<()> {
        self.emit(
            issue.project_id,
            change_type,
            issue.id,
            Some(issue.lock_version),
            actor,
            serde_json::to_value(issue)?,
        )?;
        Ok(())
    }

    /// Resolve a version and apply the locked-version policy. Returns the
    /// version and an optional warning under the warn policy.
    fn check_assignable(
        &self,
        project_id: i64,
        issue_id: i64,
        version_id: i64,
        strict: bool,
    ) -> Result<(Version, Option<String>)> {
        let version = self.db.get_version(version_id)?;
        let assignable = self.db.assignable_versions(project_id)?;
        if !assignable.iter().any(|v| v.id == version.id) {
            return Err(Error::VersionNotAssignable {
                issue_id,
                version_id,
                assignable: assignable.iter().map(Version::to_ref).collect(),
            });
        }
        if version.status.is_frozen() {
            let policy = if strict {
                LockedVersionPolicy::Reject
            } else {
                self.config.locked_version_policy
            };
            match policy {
                LockedVersionPolicy::Reject => {
                    return Err(Error::VersionLocked {
                        name: version.name.clone(),
                        status: version.status.to_string(),
                    });
                }
                LockedVersionPolicy::Warn => {
                    let warning = format!(
                        "version '{}' is {}; assignment recorded anyway",
                        version.name, version.status
                    );
                    return Ok((version, Some(warning)));
                }
            }
        }
        Ok((version, None))
    }

    /// Enforce the UserStory child-completion rule before entering a testing
    /// or resolved state.
    fn check_children_complete(&self, issue: &Issue, target: Status) -> Result<()> {
        if !workflow::requires_children_complete(issue.tracker, target) {
            return Ok(());
        }
        let incomplete: Vec<String> = self
            .db
            .children_of(issue.id)?
            .iter()
            .filter(|c| c.tracker == Tracker::Task && !c.status.is_terminal())
            .map(|c| c.subject.clone())
            .collect();
        if incomplete.is_empty() {
            return Ok(());
        }
        Err(Error::WorkflowViolation {
            issue_id: issue.id,
            from: issue.status.to_string(),
            to: target.to_string(),
            role: "any".to_string(),
            detail: format!("\n  incomplete tasks: {}", incomplete.join(", ")),
        })
    }

    fn check_batch_size(&self, requested: usize) -> Result<()> {
        if requested == 0 {
            return Err(Error::ValidationFailed(
                "no issues specified for batch operation".to_string(),
            ));
        }
        if requested > self.config.batch_limit {
            return Err(Error::BatchTooLarge {
                requested,
                limit: self.config.batch_limit,
            });
        }
        Ok(())
    }

    fn record_history(
        &self,
        project_id: i64,
        operation: &str,
        actor: &Actor,
        summary: &BatchSummary,
    ) -> Result<()> {
        let entry = BatchHistoryEntry {
            id: 0,
            project_id,
            operation: operation.to_string(),
            actor: actor.name.clone(),
            affected_count: summary.total as i64,
            success_count: summary.success_count as i64,
            error_count: summary.error_count as i64,
            elapsed_ms: summary.elapsed_ms,
            created_at: Utc::now(),
        };
        self.db.record_batch_history(&entry)?;
        tracing::info!(
            project_id,
            operation,
            total = summary.total,
            success = summary.success_count,
            errors = summary.error_count,
            elapsed_ms = summary.elapsed_ms,
            "batch operation recorded"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Single-issue operations
    // ------------------------------------------------------------------

    /// Creation path: tracker, optional parent, optional initial version.
    pub fn create_issue(&self, mut new: NewIssue, actor: &Actor) -> Result<Issue> {
        self.db.get_project(new.project_id)?;
        if new.subject.trim().is_empty() {
            return Err(Error::ValidationFailed("subject must not be empty".to_string()));
        }

        if let Some(parent_id) = new.parent_id {
            let parent = self.db.get_issue(parent_id)?;
            if parent.is_deleted() {
                return Err(Error::ValidationFailed(format!(
                    "parent issue #{parent_id} is deleted"
                )));
            }
            hierarchy::validate_parent(new.tracker, parent.tracker)?;
        }

        if let Some(version_id) = new.version_id {
            let (version, warning) =
                self.check_assignable(new.project_id, 0, version_id, false)?;
            if let Some(w) = warning {
                tracing::warn!(version_id, "{w}");
            }
            if let Some(d) =
                dates::compute_dates_for(new.start_date, new.estimated_hours, &version, &self.config)
            {
                new.start_date = Some(d.start);
                new.due_date = Some(d.due);
            }
        }

        let issue = self.db.insert_issue(&new)?;
        self.emit_issue(ChangeType::IssueCreated, &issue, actor)?;
        Ok(issue)
    }

    /// Drag-and-drop: reassign parent and/or version in one step, then
    /// cascade the version to descendants.
    pub fn move_issue(&self, id: i64, req: MoveRequest, actor: &Actor) -> Result<MoveOutcome> {
        let before = self.db.get_issue(id)?;
        if before.is_deleted() {
            return Err(Error::ValidationFailed(format!(
                "issue #{id} is deleted and cannot be moved"
            )));
        }
        guard::check(&before, req.expected_lock_version)?;

        let parent_changed = before.parent_id != req.target_parent_id;
        let version_changed = before.version_id != req.target_version_id;
        if !parent_changed && !version_changed {
            return Ok(MoveOutcome {
                issue: before,
                changes: Vec::new(),
                propagation: None,
                warnings: Vec::new(),
            });
        }

        if parent_changed {
            if let Some(parent_id) = req.target_parent_id {
                let parent = self.db.get_issue(parent_id)?;
                if parent.is_deleted() {
                    return Err(Error::ValidationFailed(format!(
                        "target parent #{parent_id} is deleted"
                    )));
                }
                hierarchy::validate_parent(before.tracker, parent.tracker)?;
                if parent_id == id || self.db.issue_ancestor_ids(parent_id)?.contains(&id) {
                    return Err(Error::HierarchyCycle {
                        issue_id: id,
                        parent_id,
                    });
                }
            }
        }

        let mut warnings = Vec::new();
        let version = if version_changed {
            match req.target_version_id {
                Some(version_id) => {
                    let (version, warning) =
                        self.check_assignable(before.project_id, id, version_id, req.strict)?;
                    warnings.extend(warning);
                    Some(version)
                }
                None => None,
            }
        } else {
            None
        };

        let config = &self.config;
        let written = guard::apply(&self.db, id, req.expected_lock_version, |issue| {
            let mut changed = false;
            if parent_changed {
                issue.parent_id = req.target_parent_id;
                changed = true;
            }
            if version_changed {
                issue.version_id = req.target_version_id;
                if let Some(v) = &version {
                    if let Some(d) = dates::compute_dates(issue, v, config) {
                        issue.start_date = Some(d.start);
                        issue.due_date = Some(d.due);
                    }
                }
                issue.version_pinned = !actor.automation && req.target_version_id.is_some();
                changed = true;
            }
            Ok(changed)
        })?;

        let mut changes = Vec::new();
        for (field, old, new) in [
            (
                "parent_id",
                serde_json::to_value(before.parent_id)?,
                serde_json::to_value(written.parent_id)?,
            ),
            (
                "version_id",
                serde_json::to_value(before.version_id)?,
                serde_json::to_value(written.version_id)?,
            ),
            (
                "start_date",
                serde_json::to_value(before.start_date)?,
                serde_json::to_value(written.start_date)?,
            ),
            (
                "due_date",
                serde_json::to_value(before.due_date)?,
                serde_json::to_value(written.due_date)?,
            ),
        ] {
            if old != new {
                changes.push(FieldDelta {
                    field: field.to_string(),
                    old_value: old,
                    new_value: new,
                });
            }
        }

        let propagation = if version_changed && req.propagate_to_children {
            let (updated, skipped) = dates::propagate_to_descendants(
                &self.db,
                id,
                version.as_ref(),
                req.force_update,
                &self.config,
            )?;
            for child in &updated {
                self.emit_issue(ChangeType::VersionAssigned, child, actor)?;
            }
            Some(PropagationSummary {
                updated_children: updated,
                skipped_children: skipped,
            })
        } else {
            None
        };

        self.emit(
            written.project_id,
            ChangeType::IssueMoved,
            written.id,
            Some(written.lock_version),
            actor,
            serde_json::json!({ "issue": written, "changes": changes }),
        )?;

        Ok(MoveOutcome {
            issue: written,
            changes,
            propagation,
            warnings,
        })
    }

    /// Guarded field edit, including a workflow-checked status transition.
    pub fn update_issue(&self, id: i64, update: IssueUpdate, actor: &Actor) -> Result<Issue> {
        let before = self.db.get_issue(id)?;
        if before.is_deleted() {
            return Err(Error::ValidationFailed(format!(
                "issue #{id} is deleted and cannot be edited"
            )));
        }
        if let Some(ratio) = update.done_ratio {
            if ratio > 100 {
                return Err(Error::ValidationFailed(format!(
                    "done_ratio must be 0-100, got {ratio}"
                )));
            }
        }
        if let Some(target) = update.status {
            if target != before.status {
                workflow::validate_transition(id, actor.role, before.status, target)?;
                self.check_children_complete(&before, target)?;
            }
        }

        let written = guard::apply(&self.db, id, update.expected_lock_version, |issue| {
            let mut changed = false;
            if let Some(subject) = &update.subject {
                if issue.subject != *subject {
                    issue.subject = subject.clone();
                    changed = true;
                }
            }
            if let Some(description) = &update.description {
                if issue.description.as_deref() != Some(description.as_str()) {
                    issue.description = Some(description.clone());
                    changed = true;
                }
            }
            if let Some(status) = update.status {
                if issue.status != status {
                    issue.status = status;
                    changed = true;
                }
            }
            if let Some(priority) = update.priority {
                if issue.priority != priority {
                    issue.priority = priority;
                    changed = true;
                }
            }
            if update.clear_assignee {
                if issue.assignee.is_some() {
                    issue.assignee = None;
                    changed = true;
                }
            } else if let Some(assignee) = &update.assignee {
                if issue.assignee.as_deref() != Some(assignee.as_str()) {
                    issue.assignee = Some(assignee.clone());
                    changed = true;
                }
            }
            if let Some(ratio) = update.done_ratio {
                if issue.done_ratio != ratio {
                    issue.done_ratio = ratio;
                    changed = true;
                }
            }
            if let Some(hours) = update.estimated_hours {
                if issue.estimated_hours != Some(hours) {
                    issue.estimated_hours = Some(hours);
                    changed = true;
                }
            }
            if let Some(start) = update.start_date {
                if issue.start_date != Some(start) {
                    issue.start_date = Some(start);
                    changed = true;
                }
            }
            if let Some(due) = update.due_date {
                if issue.due_date != Some(due) {
                    issue.due_date = Some(due);
                    changed = true;
                }
            }
            Ok(changed)
        })?;

        if written.lock_version != before.lock_version {
            let change_type = if update.status.is_some() && written.status != before.status {
                ChangeType::StatusChanged
            } else if update.priority.is_some() && written.priority != before.priority {
                ChangeType::PriorityChanged
            } else {
                ChangeType::IssueUpdated
            };
            self.emit_issue(change_type, &written, actor)?;
        }
        Ok(written)
    }

    /// Single-issue version assignment with cascade; the entry point behind
    /// bulk assignment and the automation service.
    pub fn assign_version(
        &self,
        issue_id: i64,
        version_id: Option<i64>,
        req: AssignVersionRequest,
        actor: &Actor,
    ) -> Result<VersionChangeOutcome> {
        let outcome =
            propagation::assign_version(&self.db, issue_id, version_id, req, actor, &self.config)?;
        if outcome.issue_changed {
            self.emit_issue(ChangeType::VersionAssigned, &outcome.issue, actor)?;
        }
        for child in &outcome.updated_children {
            self.emit_issue(ChangeType::VersionAssigned, child, actor)?;
        }
        if let Some(parent) = &outcome.parent {
            self.emit_issue(ChangeType::IssueUpdated, parent, actor)?;
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Batch operations
    // ------------------------------------------------------------------

    /// Bulk field update; per-issue independence.
    pub fn batch_update(
        &self,
        project_id: i64,
        items: &[BatchItem],
        fields: &BatchUpdateFields,
        actor: &Actor,
    ) -> Result<BatchOutcome> {
        self.check_batch_size(items.len())?;
        if fields.is_empty() {
            return Err(Error::ValidationFailed(
                "no fields specified for batch update".to_string(),
            ));
        }

        let started = Instant::now();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for item in items {
            match self.batch_update_one(item, fields, actor) {
                Ok(issue) => succeeded.push(issue),
                Err(e) => failed.push(BatchFailure::from_error(item.id, &e)),
            }
        }

        let summary = BatchSummary {
            total: items.len(),
            success_count: succeeded.len(),
            error_count: failed.len(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };
        self.record_history(project_id, "batch_update", actor, &summary)?;
        Ok(BatchOutcome {
            succeeded,
            failed,
            summary,
        })
    }

    fn batch_update_one(
        &self,
        item: &BatchItem,
        fields: &BatchUpdateFields,
        actor: &Actor,
    ) -> Result<Issue> {
        let before = self.db.get_issue(item.id)?;
        if before.is_deleted() {
            return Err(Error::ValidationFailed(format!(
                "issue #{} is deleted",
                item.id
            )));
        }
        if let Some(target) = fields.status {
            if target != before.status {
                workflow::validate_transition(item.id, actor.role, before.status, target)?;
                self.check_children_complete(&before, target)?;
            }
        }
        if let Some(version_id) = fields.version_id {
            self.check_assignable(before.project_id, item.id, version_id, false)?;
        }

        let written = guard::apply(&self.db, item.id, item.expected_lock_version, |issue| {
            let mut changed = false;
            if let Some(status) = fields.status {
                if issue.status != status {
                    issue.status = status;
                    changed = true;
                }
            }
            if let Some(assignee) = &fields.assignee {
                if issue.assignee.as_deref() != Some(assignee.as_str()) {
                    issue.assignee = Some(assignee.clone());
                    changed = true;
                }
            }
            if let Some(version_id) = fields.version_id {
                if issue.version_id != Some(version_id) {
                    issue.version_id = Some(version_id);
                    issue.version_pinned = !actor.automation;
                    changed = true;
                }
            }
            if let Some(priority) = fields.priority {
                if issue.priority != priority {
                    issue.priority = priority;
                    changed = true;
                }
            }
            Ok(changed)
        })?;

        if written.lock_version != before.lock_version {
            self.emit_issue(ChangeType::IssueUpdated, &written, actor)?;
        }
        Ok(written)
    }

    /// Bulk version assignment with optional cascade; `force_update`
    /// bypasses the manual-pin skip rule.
    pub fn batch_assign_version(
        &self,
        project_id: i64,
        items: &[BatchItem],
        version_id: Option<i64>,
        propagate_to_children: bool,
        force_update: bool,
        actor: &Actor,
    ) -> Result<VersionAssignOutcome> {
        self.check_batch_size(items.len())?;

        let started = Instant::now();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut propagated = Vec::new();
        let mut skipped_children = Vec::new();
        let mut warnings = Vec::new();

        for item in items {
            let req = AssignVersionRequest {
                expected_lock_version: item.expected_lock_version,
                cascade: CascadeOptions {
                    update_parent: false,
                    propagate_to_children,
                    force_update,
                    strict: false,
                },
            };
            match self.assign_version(item.id, version_id, req, actor) {
                Ok(outcome) => {
                    succeeded.push(outcome.issue);
                    propagated.extend(outcome.updated_children);
                    skipped_children.extend(outcome.skipped_children);
                    warnings.extend(outcome.warnings);
                }
                Err(e) => failed.push(BatchFailure::from_error(item.id, &e)),
            }
        }

        let summary = BatchSummary {
            total: items.len(),
            success_count: succeeded.len(),
            error_count: failed.len(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };
        self.record_history(project_id, "batch_assign_version", actor, &summary)?;
        Ok(VersionAssignOutcome {
            batch: BatchOutcome {
                succeeded,
                failed,
                summary,
            },
            propagated,
            skipped_children,
            warnings,
        })
    }

    /// Bulk status transition; violations are collected, not fatal.
    pub fn batch_transition_status(
        &self,
        project_id: i64,
        items: &[BatchItem],
        target: Status,
        workflow_validation: bool,
        actor: &Actor,
    ) -> Result<StatusTransitionOutcome> {
        self.check_batch_size(items.len())?;

        let started = Instant::now();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut violations = Vec::new();

        for item in items {
            match self.transition_one(item, target, workflow_validation, actor) {
                Ok(issue) => succeeded.push(issue),
                Err(e) => {
                    if let Error::WorkflowViolation { from, to, .. } = &e {
                        violations.push(WorkflowViolationDetail {
                            issue_id: item.id,
                            from: from.parse().unwrap_or(target),
                            to: to.parse().unwrap_or(target),
                            reason: e.to_string(),
                        });
                    }
                    failed.push(BatchFailure::from_error(item.id, &e));
                }
            }
        }

        let summary = BatchSummary {
            total: items.len(),
            success_count: succeeded.len(),
            error_count: failed.len(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };
        self.record_history(project_id, "batch_transition_status", actor, &summary)?;
        Ok(StatusTransitionOutcome {
            batch: BatchOutcome {
                succeeded,
                failed,
                summary,
            },
            workflow_violations: violations,
        })
    }

    fn transition_one(
        &self,
        item: &BatchItem,
        target: Status,
        workflow_validation: bool,
        actor: &Actor,
    ) -> Result<Issue> {
        let before = self.db.get_issue(item.id)?;
        if before.is_deleted() {
            return Err(Error::ValidationFailed(format!(
                "issue #{} is deleted",
                item.id
            )));
        }
        if workflow_validation && target != before.status {
            workflow::validate_transition(item.id, actor.role, before.status, target)?;
            self.check_children_complete(&before, target)?;
        }

        let written = guard::apply(&self.db, item.id, item.expected_lock_version, |issue| {
            if issue.status == target {
                return Ok(false);
            }
            issue.status = target;
            Ok(true)
        })?;

        if written.lock_version != before.lock_version {
            self.emit_issue(ChangeType::StatusChanged, &written, actor)?;
        }
        Ok(written)
    }

    /// Bulk priority adjustment; per-pair independence.
    pub fn batch_adjust_priorities(
        &self,
        project_id: i64,
        adjustments: &[PriorityAdjustment],
        actor: &Actor,
    ) -> Result<BatchOutcome> {
        self.check_batch_size(adjustments.len())?;

        let started = Instant::now();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for adj in adjustments {
            let result = (|| -> Result<Issue> {
                let before = self.db.get_issue(adj.id)?;
                if before.is_deleted() {
                    return Err(Error::ValidationFailed(format!(
                        "issue #{} is deleted",
                        adj.id
                    )));
                }
                let written =
                    guard::apply(&self.db, adj.id, adj.expected_lock_version, |issue| {
                        if issue.priority == adj.priority {
                            return Ok(false);
                        }
                        issue.priority = adj.priority;
                        Ok(true)
                    })?;
                if written.lock_version != before.lock_version {
                    self.emit_issue(ChangeType::PriorityChanged, &written, actor)?;
                }
                Ok(written)
            })();
            match result {
                Ok(issue) => succeeded.push(issue),
                Err(e) => failed.push(BatchFailure::from_error(adj.id, &e)),
            }
        }

        let summary = BatchSummary {
            total: adjustments.len(),
            success_count: succeeded.len(),
            error_count: failed.len(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };
        self.record_history(project_id, "batch_adjust_priorities", actor, &summary)?;
        Ok(BatchOutcome {
            succeeded,
            failed,
            summary,
        })
    }

    /// Logical deletion preserving relations for audit. Cascades only to
    /// children with no relations outside the deleted set; everything kept
    /// alive is reported through `preserved_relations`.
    pub fn soft_delete(
        &self,
        project_id: i64,
        items: &[BatchItem],
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<SoftDeleteOutcome> {
        self.check_batch_size(items.len())?;

        let started = Instant::now();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut cascade_deleted = Vec::new();
        let mut preserved_relations = Vec::new();
        let mut deleted_set: HashSet<i64> = HashSet::new();

        for item in items {
            match self.delete_one(item.id, item.expected_lock_version, reason.as_deref(), actor) {
                Ok(issue) => {
                    deleted_set.insert(issue.id);
                    succeeded.push(issue);
                }
                Err(e) => {
                    failed.push(BatchFailure::from_error(item.id, &e));
                }
            }
        }

        // Cascade pass: depth-first below every deleted root.
        let roots: Vec<i64> = succeeded.iter().map(|i| i.id).collect();
        for root in roots {
            self.cascade_delete(
                root,
                reason.as_deref(),
                actor,
                &mut deleted_set,
                &mut cascade_deleted,
                &mut preserved_relations,
            )?;
        }

        let summary = BatchSummary {
            total: items.len(),
            success_count: succeeded.len(),
            error_count: failed.len(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };
        self.record_history(project_id, "soft_delete", actor, &summary)?;
        Ok(SoftDeleteOutcome {
            batch: BatchOutcome {
                succeeded,
                failed,
                summary,
            },
            cascade_deleted,
            preserved_relations,
        })
    }

    fn delete_one(
        &self,
        id: i64,
        expected_lock: Option<i64>,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<Issue> {
        let before = self.db.get_issue(id)?;
        if before.is_deleted() {
            return Err(Error::ValidationFailed(format!(
                "issue #{id} is already deleted"
            )));
        }
        let written = guard::apply(&self.db, id, expected_lock, |issue| {
            issue.deleted_at = Some(Utc::now());
            issue.deleted_reason = reason.map(|r| r.to_string());
            Ok(true)
        })?;
        self.emit_issue(ChangeType::IssueDeleted, &written, actor)?;
        Ok(written)
    }

    fn cascade_delete(
        &self,
        parent_id: i64,
        reason: Option<&str>,
        actor: &Actor,
        deleted_set: &mut HashSet<i64>,
        cascade_deleted: &mut Vec<i64>,
        preserved_relations: &mut Vec<Relation>,
    ) -> Result<()> {
        for child in self.db.children_of(parent_id)? {
            if deleted_set.contains(&child.id) {
                continue;
            }
            let outside: Vec<Relation> = self
                .db
                .relations_involving(child.id)?
                .into_iter()
                .filter(|r| {
                    let other = if r.from_id == child.id { r.to_id } else { r.from_id };
                    !deleted_set.contains(&other)
                })
                .collect();
            if !outside.is_empty() {
                preserved_relations.extend(outside);
                continue;
            }
            let written = self.delete_one(child.id, None, reason, actor)?;
            deleted_set.insert(written.id);
            cascade_deleted.push(written.id);
            self.cascade_delete(
                written.id,
                reason,
                actor,
                deleted_set,
                cascade_deleted,
                preserved_relations,
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries and change distribution
    // ------------------------------------------------------------------

    /// Batch-operation audit query, newest first.
    pub fn operation_history(
        &self,
        project_id: i64,
        filter: &HistoryFilter,
    ) -> Result<Vec<BatchHistoryEntry>> {
        self.db.batch_history(project_id, filter)
    }

    /// Pre-flight impact of a version change.
    pub fn calculate_impact(
        &self,
        issue_id: i64,
        update_parent: bool,
    ) -> Result<dates::ImpactSummary> {
        dates::calculate_impact(&self.db, issue_id, update_parent)
    }

    /// Advisory parent/child version divergence report.
    pub fn check_version_consistency(&self, project_id: i64) -> Result<ConsistencyReport> {
        propagation::check_version_consistency(&self.db, project_id)
    }

    /// Register a push observer on a project channel.
    pub fn subscribe(
        &self,
        project_id: i64,
        actor: &Actor,
    ) -> Result<(String, std::sync::mpsc::Receiver<ChangeEvent>)> {
        self.db.get_project(project_id)?;
        Ok(self.distributor.subscribe(project_id, actor))
    }

    /// Refresh a push session. Returns the new expiry time.
    pub fn heartbeat(&self, session_id: &str) -> Result<chrono::DateTime<Utc>> {
        self.distributor.heartbeat(session_id)
    }

    /// Drop a push session. Returns true if it existed.
    pub fn unsubscribe(&self, session_id: &str) -> bool {
        self.distributor.unsubscribe(session_id)
    }

    /// True if the push session is still registered.
    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.distributor.is_subscribed(session_id)
    }

    /// Serve a pull observer from the shared event store.
    pub fn poll_events(&self, project_id: i64, since: Cursor, limit: usize) -> Result<PollPage> {
        self.db.get_project(project_id)?;
        self.distributor.poll(&self.db, project_id, since, limit)
    }

    /// Push-session listing for monitoring.
    pub fn active_sessions(&self, project_id: i64) -> Vec<SessionInfo> {
        self.distributor.active_sessions(project_id)
    }

    /// Prune expired events and sessions; run periodically.
    pub fn housekeeping(&self) -> Result<Housekeeping> {
        let cutoff = Utc::now() - Duration::hours(self.config.event_retention_hours);
        let pruned_events = self.db.prune(cutoff)?;
        let expired_sessions = self.distributor.prune_expired();
        Ok(Housekeeping {
            pruned_events,
            expired_sessions,
        })
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
