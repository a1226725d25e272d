// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Core issue types for the grid engine.
//!
//! This module contains the fundamental data types: Issue, Tracker, Status,
//! Priority, Actor, and Relation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The six fixed tracker types forming the 4-level grid hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tracker {
    /// Top-level initiative, a row on the grid.
    Epic,
    /// Deliverable under an epic.
    Feature,
    /// Unit of user-visible behavior under a feature.
    UserStory,
    /// Implementation work under a user story.
    Task,
    /// Verification work under a user story.
    Test,
    /// Defect under a user story.
    Bug,
}

impl Tracker {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tracker::Epic => "epic",
            Tracker::Feature => "feature",
            Tracker::UserStory => "user_story",
            Tracker::Task => "task",
            Tracker::Test => "test",
            Tracker::Bug => "bug",
        }
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tracker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "epic" => Ok(Tracker::Epic),
            "feature" => Ok(Tracker::Feature),
            "user_story" | "userstory" => Ok(Tracker::UserStory),
            "task" => Ok(Tracker::Task),
            "test" => Ok(Tracker::Test),
            "bug" => Ok(Tracker::Bug),
            _ => Err(Error::InvalidTracker(s.to_string())),
        }
    }
}

/// Workflow status of an issue, one per Kanban column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet triaged. Initial state for new issues.
    New,
    /// Triaged and ready to be picked up.
    Ready,
    /// Currently being worked on.
    InProgress,
    /// Awaiting code or design review.
    Review,
    /// In verification.
    Testing,
    /// Work finished and verified.
    Resolved,
    /// Closed, whether completed or abandoned.
    Closed,
}

impl Status {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Ready => "ready",
            Status::InProgress => "in_progress",
            Status::Review => "review",
            Status::Testing => "testing",
            Status::Resolved => "resolved",
            Status::Closed => "closed",
        }
    }

    /// Position of this status along the column flow, left to right.
    pub fn column_order(&self) -> u8 {
        match self {
            Status::New => 0,
            Status::Ready => 1,
            Status::InProgress => 2,
            Status::Review => 3,
            Status::Testing => 4,
            Status::Resolved => 5,
            Status::Closed => 6,
        }
    }

    /// Returns true if this is a terminal state (resolved or closed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Status::New),
            "ready" => Ok(Status::Ready),
            "in_progress" => Ok(Status::InProgress),
            "review" => Ok(Status::Review),
            "testing" => Ok(Status::Testing),
            "resolved" => Ok(Status::Resolved),
            "closed" => Ok(Status::Closed),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// Issue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
    Immediate,
}

impl Priority {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
            Priority::Immediate => "immediate",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            "immediate" => Ok(Priority::Immediate),
            _ => Err(Error::InvalidPriority(s.to_string())),
        }
    }
}

/// Role of the acting user, used by the workflow transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Developer,
    Reporter,
}

impl Role {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Developer => "developer",
            Role::Reporter => "reporter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manager" => Ok(Role::Manager),
            "developer" => Ok(Role::Developer),
            "reporter" => Ok(Role::Reporter),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

/// The acting principal behind a mutation.
///
/// Threaded explicitly through every mutating call; there is no ambient
/// current-user. Automation actors never set the manual version pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    pub role: Role,
    /// True for non-interactive tooling (issue-creation service, sync jobs).
    pub automation: bool,
}

impl Actor {
    /// Creates an interactive user actor.
    pub fn user(id: i64, name: impl Into<String>, role: Role) -> Self {
        Actor {
            id,
            name: name.into(),
            role,
            automation: false,
        }
    }

    /// Creates an automation actor (full developer rights, never pins).
    pub fn automation(name: impl Into<String>) -> Self {
        Actor {
            id: 0,
            name: name.into(),
            role: Role::Developer,
            automation: true,
        }
    }
}

/// The primary entity representing a tracked work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Database-assigned identifier.
    pub id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Tracker type, fixing the issue's hierarchy level.
    pub tracker: Tracker,
    /// Short description of the work.
    pub subject: String,
    /// Longer description providing context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current workflow state.
    pub status: Status,
    pub priority: Priority,
    /// Person this issue is assigned to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Weak back-reference to the parent issue, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    /// Target version (grid column), independent of the parent's version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    /// Completion percentage, 0-100.
    pub done_ratio: u8,
    /// True when a human set the version directly; protects the issue from
    /// non-forced cascades.
    pub version_pinned: bool,
    /// Monotonic optimistic-concurrency counter; +1 per successful mutation.
    pub lock_version: i64,
    /// Set when the issue is soft-deleted. Relations are preserved for audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Returns true if the issue has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields for creating a new issue through the engine's creation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub project_id: i64,
    pub tracker: Tracker,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

impl NewIssue {
    /// Creates a new-issue request with default status and priority.
    pub fn new(project_id: i64, tracker: Tracker, subject: impl Into<String>) -> Self {
        NewIssue {
            project_id,
            tracker,
            subject: subject.into(),
            description: None,
            status: Status::New,
            priority: Priority::Normal,
            assignee: None,
            parent_id: None,
            version_id: None,
            start_date: None,
            due_date: None,
            estimated_hours: None,
        }
    }

    /// Sets the parent (builder pattern).
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the initial version (builder pattern).
    pub fn with_version(mut self, version_id: i64) -> Self {
        self.version_id = Some(version_id);
        self
    }

    /// Sets the estimated hours (builder pattern).
    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }
}

/// Relation kinds between issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The from issue blocks the to issue.
    Blocks,
    /// Informational link.
    Relates,
}

impl RelationKind {
    /// Returns the string representation used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Blocks => "blocks",
            RelationKind::Relates => "relates",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(RelationKind::Blocks),
            "relates" => Ok(RelationKind::Relates),
            _ => Err(Error::InvalidRelation(s.to_string())),
        }
    }
}

/// A relation between two issues, preserved across soft deletion for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub from_id: i64,
    pub to_id: i64,
    pub rel: RelationKind,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
