// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Version-driven schedule dates and the cascade that applies them.
//!
//! Assigning a version to an issue derives its due date from the version's
//! effective date and its start date from the issue's estimated duration.
//! The cascade walks the issue's descendants depth-first, skipping manually
//! pinned versions unless forced, and can bracket the parent's dates over
//! the union of its children — but a child-driven cascade never rewrites the
//! parent's version.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::guard;
use crate::issue::{Actor, Issue};
use crate::version::{LockedVersionPolicy, Version};

/// Derived start/due pair for an issue under a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDates {
    pub start: NaiveDate,
    pub due: NaiveDate,
}

/// Options controlling a version change and its cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeOptions {
    /// Bracket the parent's dates over the union of its children.
    pub update_parent: bool,
    /// Apply the version and recomputed dates to every descendant.
    pub propagate_to_children: bool,
    /// Overwrite descendants with manually pinned versions.
    pub force_update: bool,
    /// Escalate the locked-version policy from warn to reject.
    pub strict: bool,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        CascadeOptions {
            update_parent: false,
            propagate_to_children: true,
            force_update: false,
            strict: false,
        }
    }
}

/// Why a descendant was left untouched by a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A human set this issue's version after the parent's; automation does
    /// not silently overwrite a manual choice.
    ManuallyPinned,
}

/// A descendant skipped by the cascade, reported so callers can surface it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedChild {
    pub id: i64,
    pub reason: SkipReason,
}

/// Why a requested parent-date update was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentSkipReason {
    /// No child carries dates to bracket over.
    NoDatedChildren,
    /// Bracketing would push the parent past its own version's effective
    /// date; the update is reported, not forced.
    OutsideVersionWindow,
}

/// Structured result of a version change with date cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionChangeOutcome {
    /// The issue after the change.
    pub issue: Issue,
    /// Whether the issue row was actually written.
    pub issue_changed: bool,
    /// Dates derived for the issue, if the version had an effective date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<ScheduleDates>,
    /// Descendants that were written.
    pub updated_children: Vec<Issue>,
    /// Descendants left untouched, with reasons.
    pub skipped_children: Vec<SkippedChild>,
    /// The parent after a date-bracketing update, when one happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Issue>,
    /// Why the parent update was skipped, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_skipped: Option<ParentSkipReason>,
    /// Sibling IDs that received no change, included so callers can
    /// invalidate caches.
    pub siblings: Vec<i64>,
    /// Non-fatal findings (locked-version assignments under the warn
    /// policy).
    pub warnings: Vec<String>,
}

/// Pre-flight estimate of how many issues a version change would touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub total: usize,
    pub issue_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub sibling_ids: Vec<i64>,
    pub descendant_ids: Vec<i64>,
}

/// Duration in days derived from estimated hours, minimum one day.
pub fn estimated_duration_days(estimated_hours: Option<f64>, config: &EngineConfig) -> i64 {
    let days = match estimated_hours {
        Some(hours) if hours > 0.0 && config.hours_per_day > 0.0 => {
            (hours / config.hours_per_day).ceil() as i64
        }
        _ => 0,
    };
    days.max(config.min_duration_days).max(1)
}

/// Derive schedule dates from a version for an issue-shaped pair of inputs.
///
/// The due date is the version's effective date; with no effective date
/// there is no forced change and the result is `None`. The start date is the
/// later of the existing start and the due date minus the estimated
/// duration, clamped to never pass the due date.
pub fn compute_dates_for(
    start_date: Option<NaiveDate>,
    estimated_hours: Option<f64>,
    version: &Version,
    config: &EngineConfig,
) -> Option<ScheduleDates> {
    let due = version.effective_date?;
    let duration = estimated_duration_days(estimated_hours, config);
    let derived = due
        .checked_sub_signed(Duration::days(duration))
        .unwrap_or(due);
    let start = match start_date {
        Some(existing) if existing > derived => existing,
        _ => derived,
    };
    Some(ScheduleDates {
        start: start.min(due),
        due,
    })
}

/// Derive schedule dates for `issue` under `version`.
pub fn compute_dates(issue: &Issue, version: &Version, config: &EngineConfig) -> Option<ScheduleDates> {
    compute_dates_for(issue.start_date, issue.estimated_hours, version, config)
}

/// Apply `version` (or clear it, for `None`) to one issue row under the
/// guard, recomputing dates. Returns the written issue and whether a write
/// happened.
fn apply_version_to_issue(
    db: &Database,
    id: i64,
    expected_lock: Option<i64>,
    version: Option<&Version>,
    pin: Option<bool>,
    config: &EngineConfig,
) -> Result<(Issue, bool)> {
    let mut wrote = false;
    let issue = guard::apply(db, id, expected_lock, |issue| {
        let new_version_id = version.map(|v| v.id);
        let dates = version.and_then(|v| compute_dates(issue, v, config));
        let mut changed = false;
        let mut version_changed = false;

        if issue.version_id != new_version_id {
            issue.version_id = new_version_id;
            changed = true;
            version_changed = true;
        }
        if let Some(d) = dates {
            if issue.start_date != Some(d.start) {
                issue.start_date = Some(d.start);
                changed = true;
            }
            if issue.due_date != Some(d.due) {
                issue.due_date = Some(d.due);
                changed = true;
            }
        }
        if version_changed {
            if let Some(pinned) = pin {
                issue.version_pinned = pinned && new_version_id.is_some();
            }
        }
        wrote = changed;
        Ok(changed)
    })?;
    Ok((issue, wrote))
}

/// Walk the live descendants of `root_id` depth-first and apply the version
/// and recomputed dates to each, skipping manually pinned issues unless
/// `force`. A visited set guards against caller-supplied parent cycles.
pub fn propagate_to_descendants(
    db: &Database,
    root_id: i64,
    version: Option<&Version>,
    force: bool,
    config: &EngineConfig,
) -> Result<(Vec<Issue>, Vec<SkippedChild>)> {
    let mut updated = Vec::new();
    let mut skipped = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(root_id);

    let mut stack: Vec<Issue> = db.children_of(root_id)?;
    while let Some(child) = stack.pop() {
        if !visited.insert(child.id) {
            continue;
        }
        // Push grandchildren regardless of the pin outcome below; the pin
        // protects one issue, not its subtree.
        let mut grandchildren = db.children_of(child.id)?;
        stack.append(&mut grandchildren);

        if child.version_pinned && !force {
            skipped.push(SkippedChild {
                id: child.id,
                reason: SkipReason::ManuallyPinned,
            });
            continue;
        }

        // A forced overwrite clears the pin: the version is no longer the
        // human's choice.
        let (written, changed) =
            apply_version_to_issue(db, child.id, None, version, Some(false), config)?;
        if changed {
            updated.push(written);
        }
    }

    Ok((updated, skipped))
}

/// Bracket the parent's dates over the union of its children's ranges. The
/// parent's version is never changed here. Returns the written parent, a
/// skip reason, and the sibling IDs that received no change.
fn bracket_parent_dates(
    db: &Database,
    issue: &Issue,
    parent_id: i64,
) -> Result<(Option<Issue>, Option<ParentSkipReason>, Vec<i64>)> {
    let children = db.children_of(parent_id)?;
    let siblings: Vec<i64> = children
        .iter()
        .filter(|c| c.id != issue.id)
        .map(|c| c.id)
        .collect();

    let union_start = children.iter().filter_map(|c| c.start_date).min();
    let union_due = children.iter().filter_map(|c| c.due_date).max();
    let (Some(start), Some(due)) = (union_start, union_due) else {
        return Ok((None, Some(ParentSkipReason::NoDatedChildren), siblings));
    };

    let parent = db.get_issue(parent_id)?;
    if let Some(version_id) = parent.version_id {
        let parent_version = db.get_version(version_id)?;
        if let Some(effective) = parent_version.effective_date {
            if due > effective {
                return Ok((None, Some(ParentSkipReason::OutsideVersionWindow), siblings));
            }
        }
    }

    let mut wrote = false;
    let written = guard::apply(db, parent_id, None, |p| {
        let mut changed = false;
        if p.start_date != Some(start) {
            p.start_date = Some(start);
            changed = true;
        }
        if p.due_date != Some(due) {
            p.due_date = Some(due);
            changed = true;
        }
        wrote = changed;
        Ok(changed)
    })?;

    if wrote {
        Ok((Some(written), None, siblings))
    } else {
        Ok((None, None, siblings))
    }
}

/// Change an issue's version, recompute dates, and run the cascade.
///
/// Validates the target against the issue's assignable set and the
/// locked-version policy before any write. See [`VersionChangeOutcome`] for
/// the structured result.
#[allow(clippy::too_many_arguments)]
pub fn change_version_with_dates(
    db: &Database,
    issue_id: i64,
    new_version: Option<&Version>,
    expected_lock: Option<i64>,
    opts: CascadeOptions,
    actor: &Actor,
    config: &EngineConfig,
) -> Result<VersionChangeOutcome> {
    let issue = db.get_issue(issue_id)?;
    if issue.is_deleted() {
        return Err(Error::ValidationFailed(format!(
            "issue #{issue_id} is deleted and cannot be modified"
        )));
    }

    let mut warnings = Vec::new();
    if let Some(version) = new_version {
        let assignable = db.assignable_versions(issue.project_id)?;
        if !assignable.iter().any(|v| v.id == version.id) {
            return Err(Error::VersionNotAssignable {
                issue_id,
                version_id: version.id,
                assignable: assignable.iter().map(Version::to_ref).collect(),
            });
        }
        if version.status.is_frozen() {
            let policy = if opts.strict {
                LockedVersionPolicy::Reject
            } else {
                config.locked_version_policy
            };
            match policy {
                LockedVersionPolicy::Reject => {
                    return Err(Error::VersionLocked {
                        name: version.name.clone(),
                        status: version.status.to_string(),
                    });
                }
                LockedVersionPolicy::Warn => warnings.push(format!(
                    "version '{}' is {}; assignment recorded anyway",
                    version.name, version.status
                )),
            }
        }
    }

    // A direct assignment by a human pins the version against future
    // non-forced cascades; automation never pins.
    let pin = Some(!actor.automation);
    let (written, issue_changed) =
        apply_version_to_issue(db, issue_id, expected_lock, new_version, pin, config)?;
    let dates = new_version.and_then(|v| compute_dates(&written, v, config));

    let (updated_children, skipped_children) = if opts.propagate_to_children {
        propagate_to_descendants(db, issue_id, new_version, opts.force_update, config)?
    } else {
        (Vec::new(), Vec::new())
    };

    let (parent, parent_skipped, siblings) = match (opts.update_parent, written.parent_id) {
        (true, Some(parent_id)) => bracket_parent_dates(db, &written, parent_id)?,
        _ => (None, None, Vec::new()),
    };

    Ok(VersionChangeOutcome {
        issue: written,
        issue_changed,
        dates,
        updated_children,
        skipped_children,
        parent,
        parent_skipped,
        siblings,
        warnings,
    })
}

/// Pre-flight impact of a version change: the issue itself, its descendants,
/// and (with `update_parent`) the parent and siblings. Nothing is mutated.
pub fn calculate_impact(db: &Database, issue_id: i64, update_parent: bool) -> Result<ImpactSummary> {
    let issue = db.get_issue(issue_id)?;

    let mut descendant_ids = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(issue_id);
    let mut stack: Vec<Issue> = db.children_of(issue_id)?;
    while let Some(child) = stack.pop() {
        if !visited.insert(child.id) {
            continue;
        }
        descendant_ids.push(child.id);
        let mut grandchildren = db.children_of(child.id)?;
        stack.append(&mut grandchildren);
    }
    descendant_ids.sort_unstable();

    let mut issue_ids = vec![issue_id];
    issue_ids.extend(&descendant_ids);

    let (parent_id, sibling_ids) = if update_parent {
        match issue.parent_id {
            Some(pid) => {
                let siblings: Vec<i64> = db
                    .children_of(pid)?
                    .iter()
                    .filter(|c| c.id != issue_id)
                    .map(|c| c.id)
                    .collect();
                issue_ids.push(pid);
                issue_ids.extend(&siblings);
                (Some(pid), siblings)
            }
            None => (None, Vec::new()),
        }
    } else {
        (None, Vec::new())
    };

    Ok(ImpactSummary {
        total: issue_ids.len(),
        issue_ids,
        parent_id,
        sibling_ids,
        descendant_ids,
    })
}

#[cfg(test)]
#[path = "dates_tests.rs"]
mod tests;
