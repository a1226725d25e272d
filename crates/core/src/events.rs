// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Change events and the event-store abstraction.
//!
//! Every successful mutation is recorded as a [`ChangeEvent`] in an
//! append-only, per-project store. Push and pull observers both read from
//! this one store, so the two paths cannot diverge.
//!
//! Ordering: events are ordered by server-assigned timestamp; ties are
//! broken by insertion order. The [`Cursor`] captures both, so polling with
//! an exclusive `since` cursor never skips or repeats an event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A position in a project's change-event stream.
///
/// Server-assigned; clients treat it as opaque. String form:
/// `{ts_ms}-{seq}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    /// Server wall-clock milliseconds since Unix epoch.
    pub ts_ms: i64,
    /// Insertion-order tiebreaker (event store rowid).
    pub seq: i64,
}

impl Cursor {
    /// Creates a cursor from its components.
    pub fn new(ts_ms: i64, seq: i64) -> Self {
        Cursor { ts_ms, seq }
    }

    /// The cursor before any event; polling from here returns everything
    /// still retained.
    pub fn origin() -> Self {
        Cursor { ts_ms: 0, seq: 0 }
    }

    /// Wall-clock timestamp of this cursor.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.ts_ms).unwrap_or_else(Utc::now)
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts_ms
            .cmp(&other.ts_ms)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ts_ms, self.seq)
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 2 {
            return Err(Error::InvalidCursor(format!(
                "expected format 'ts_ms-seq', got '{s}'"
            )));
        }
        let ts_ms = parts[0]
            .parse::<i64>()
            .map_err(|_| Error::InvalidCursor(format!("invalid ts_ms '{}' in '{s}'", parts[0])))?;
        let seq = parts[1]
            .parse::<i64>()
            .map_err(|_| Error::InvalidCursor(format!("invalid seq '{}' in '{s}'", parts[1])))?;
        Ok(Cursor::new(ts_ms, seq))
    }
}

/// What kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    IssueCreated,
    IssueUpdated,
    IssueMoved,
    IssueDeleted,
    VersionAssigned,
    StatusChanged,
    PriorityChanged,
}

impl ChangeType {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::IssueCreated => "issue_created",
            ChangeType::IssueUpdated => "issue_updated",
            ChangeType::IssueMoved => "issue_moved",
            ChangeType::IssueDeleted => "issue_deleted",
            ChangeType::VersionAssigned => "version_assigned",
            ChangeType::StatusChanged => "status_changed",
            ChangeType::PriorityChanged => "priority_changed",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "issue_created" => Ok(ChangeType::IssueCreated),
            "issue_updated" => Ok(ChangeType::IssueUpdated),
            "issue_moved" => Ok(ChangeType::IssueMoved),
            "issue_deleted" => Ok(ChangeType::IssueDeleted),
            "version_assigned" => Ok(ChangeType::VersionAssigned),
            "status_changed" => Ok(ChangeType::StatusChanged),
            "priority_changed" => Ok(ChangeType::PriorityChanged),
            _ => Err(Error::InvalidChangeType(s.to_string())),
        }
    }
}

/// What kind of resource an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Issue,
    Version,
}

impl ResourceType {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Issue => "issue",
            ResourceType::Version => "version",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "issue" => Ok(ResourceType::Issue),
            "version" => Ok(ResourceType::Version),
            _ => Err(Error::ValidationFailed(format!(
                "invalid resource type: '{s}'"
            ))),
        }
    }
}

/// The mutable half of an event, supplied by the producer. The store assigns
/// the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub change_type: ChangeType,
    pub resource_type: ResourceType,
    pub resource_id: i64,
    /// Authoritative lock value after the mutation, so observers can detect
    /// that their optimistic copy is stale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_version: Option<i64>,
    pub actor: String,
    pub payload: serde_json::Value,
}

/// A stored change event as served to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub cursor: Cursor,
    pub project_id: i64,
    pub change_type: ChangeType,
    pub resource_type: ResourceType,
    pub resource_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_version: Option<i64>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Append-only, time-ordered event storage shared by push and pull.
pub trait EventStore {
    /// Append an event; the store assigns the cursor and timestamp.
    fn append(&self, project_id: i64, record: EventRecord) -> Result<ChangeEvent>;

    /// All events for `project_id` strictly after `since`, oldest first,
    /// capped at `limit`.
    fn query_since(&self, project_id: i64, since: Cursor, limit: usize) -> Result<Vec<ChangeEvent>>;

    /// Delete events older than `cutoff`, returning how many were removed.
    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
