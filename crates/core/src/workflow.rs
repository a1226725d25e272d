// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Status transition rules.
//!
//! The table is keyed by (role, from, to). Managers may make any non-identity
//! transition. Developers follow the column flow but may not reopen closed
//! issues or close issues that were never resolved. Reporters may only close
//! from New (withdrawn) or Resolved (accepted).
//!
//! The child-completion rule (a UserStory cannot enter Testing/Resolved with
//! incomplete Tasks) needs database access and is enforced by the engine; see
//! [`requires_children_complete`].

use crate::error::{Error, Result};
use crate::issue::{Role, Status, Tracker};

/// Check whether a transition is in the allowed-transition table.
pub fn can_transition(role: Role, from: Status, to: Status) -> bool {
    if from == to {
        return false;
    }
    match role {
        Role::Manager => true,
        Role::Developer => {
            if from == Status::Closed {
                return false;
            }
            if to == Status::Closed && from != Status::Resolved {
                return false;
            }
            true
        }
        Role::Reporter => {
            to == Status::Closed && matches!(from, Status::New | Status::Resolved)
        }
    }
}

/// Allowed targets for a (role, from) pair, for hint messages.
pub fn valid_targets(role: Role, from: Status) -> Vec<Status> {
    [
        Status::New,
        Status::Ready,
        Status::InProgress,
        Status::Review,
        Status::Testing,
        Status::Resolved,
        Status::Closed,
    ]
    .into_iter()
    .filter(|to| can_transition(role, from, *to))
    .collect()
}

/// Validates a transition, returning `WorkflowViolation` with a hint on
/// failure. `issue_id` is only used for the error payload.
pub fn validate_transition(issue_id: i64, role: Role, from: Status, to: Status) -> Result<()> {
    if can_transition(role, from, to) {
        return Ok(());
    }
    let targets = valid_targets(role, from)
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::WorkflowViolation {
        issue_id,
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
        role: role.as_str().to_string(),
        detail: if targets.is_empty() {
            String::new()
        } else {
            format!("\n  hint: allowed targets: {targets}")
        },
    })
}

/// True when entering `to` on an issue of `tracker` requires all child Tasks
/// to be terminal first.
pub fn requires_children_complete(tracker: Tracker, to: Status) -> bool {
    tracker == Tracker::UserStory && matches!(to, Status::Testing | Status::Resolved)
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
