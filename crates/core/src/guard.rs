// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Optimistic-concurrency guard for issue mutations.
//!
//! Protocol: every mutating call may carry an expected `lock_version`. When
//! present and stale, the mutation is rejected with `ConcurrencyConflict`
//! before any write. When absent, the mutation is best-effort: the engine
//! retries the single-row compare-and-set a bounded number of times if it
//! loses an internal race. The guard never merges and never retries a
//! caller-supplied lock value.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::issue::Issue;

/// Retry budget for best-effort writes (no caller-supplied lock).
const UNCONDITIONAL_RETRIES: usize = 3;

/// Check a caller-supplied expected lock value against the current row.
pub fn check(issue: &Issue, expected: Option<i64>) -> Result<()> {
    match expected {
        Some(attempted) if attempted != issue.lock_version => Err(Error::ConcurrencyConflict {
            resource_id: issue.id,
            current_version: issue.lock_version,
            attempted_version: attempted,
        }),
        _ => Ok(()),
    }
}

/// Read-modify-write an issue under the guard.
///
/// `mutate` receives a copy of the current row and returns `true` to write
/// or `false` to skip (no change needed; the lock is not bumped). With
/// `expected` present, a stale value fails immediately. Without it, an
/// internal compare-and-set race is retried up to [`UNCONDITIONAL_RETRIES`]
/// times with a fresh read.
pub fn apply<F>(db: &Database, id: i64, expected: Option<i64>, mut mutate: F) -> Result<Issue>
where
    F: FnMut(&mut Issue) -> Result<bool>,
{
    let mut attempts = 0;
    loop {
        let current = db.get_issue(id)?;
        check(&current, expected)?;

        let mut updated = current.clone();
        if !mutate(&mut updated)? {
            return Ok(current);
        }

        match db.update_issue(&updated, current.lock_version) {
            Ok(written) => return Ok(written),
            Err(Error::ConcurrencyConflict { .. })
                if expected.is_none() && attempts < UNCONDITIONAL_RETRIES =>
            {
                attempts += 1;
                tracing::debug!(issue_id = id, attempts, "lost write race, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
