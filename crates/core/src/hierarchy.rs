// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchy policy: the fixed parent/child tracker table.
//!
//! Epic > Feature > UserStory > {Task, Test, Bug}. Pure functions only;
//! cycle detection against live data lives in the mutation engine, which has
//! database access.

use crate::error::{Error, Result};
use crate::issue::Tracker;

/// Trackers allowed as parent of `child`. Empty slice means the tracker is a
/// root (Epic).
pub fn allowed_parents(child: Tracker) -> &'static [Tracker] {
    match child {
        Tracker::Epic => &[],
        Tracker::Feature => &[Tracker::Epic],
        Tracker::UserStory => &[Tracker::Feature],
        Tracker::Task | Tracker::Test | Tracker::Bug => &[Tracker::UserStory],
    }
}

/// Trackers allowed as children of `parent`. Empty slice means the tracker
/// is a leaf.
pub fn allowed_children(parent: Tracker) -> &'static [Tracker] {
    match parent {
        Tracker::Epic => &[Tracker::Feature],
        Tracker::Feature => &[Tracker::UserStory],
        Tracker::UserStory => &[Tracker::Task, Tracker::Test, Tracker::Bug],
        Tracker::Task | Tracker::Test | Tracker::Bug => &[],
    }
}

/// Hierarchy level: Epic=0, Feature=1, UserStory=2, leaves=3.
pub fn level(tracker: Tracker) -> u8 {
    match tracker {
        Tracker::Epic => 0,
        Tracker::Feature => 1,
        Tracker::UserStory => 2,
        Tracker::Task | Tracker::Test | Tracker::Bug => 3,
    }
}

/// Validates a parent/child tracker pairing.
pub fn validate_parent(child: Tracker, parent: Tracker) -> Result<()> {
    if allowed_parents(child).contains(&parent) {
        return Ok(());
    }
    let allowed = allowed_parents(child)
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::InvalidHierarchy {
        child: child.as_str().to_string(),
        parent: parent.as_str().to_string(),
        allowed: if allowed.is_empty() {
            "(none, this tracker is a root)".to_string()
        } else {
            allowed
        },
    })
}

#[cfg(test)]
#[path = "hierarchy_tests.rs"]
mod tests;
