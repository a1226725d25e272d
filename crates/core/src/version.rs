// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Version (release milestone) types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Lifecycle status of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Accepting new assignments.
    Open,
    /// Feature-frozen; new assignments are suspect.
    Locked,
    /// Shipped; new assignments are suspect.
    Closed,
}

impl VersionStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Open => "open",
            VersionStatus::Locked => "locked",
            VersionStatus::Closed => "closed",
        }
    }

    /// True for locked or closed versions, where new assignments are
    /// warned about (or rejected under a strict policy).
    pub fn is_frozen(&self) -> bool {
        matches!(self, VersionStatus::Locked | VersionStatus::Closed)
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "open" => Ok(VersionStatus::Open),
            "locked" => Ok(VersionStatus::Locked),
            "closed" => Ok(VersionStatus::Closed),
            _ => Err(Error::InvalidVersionStatus(s.to_string())),
        }
    }
}

/// How a version is shared down the project tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSharing {
    /// Visible only to the owning project.
    None,
    /// Visible to the owning project and its sub-projects.
    Descendants,
    /// Visible to every project.
    System,
}

impl VersionSharing {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionSharing::None => "none",
            VersionSharing::Descendants => "descendants",
            VersionSharing::System => "system",
        }
    }
}

impl fmt::Display for VersionSharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VersionSharing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(VersionSharing::None),
            "descendants" => Ok(VersionSharing::Descendants),
            "system" => Ok(VersionSharing::System),
            _ => Err(Error::InvalidVersionSharing(s.to_string())),
        }
    }
}

/// A release milestone, a column on the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target release date; drives the schedule-date cascade. Nullable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    pub status: VersionStatus,
    pub sharing: VersionSharing,
}

impl Version {
    /// Compact reference used in diagnostic payloads.
    pub fn to_ref(&self) -> VersionRef {
        VersionRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Fields for creating a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVersion {
    pub project_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    pub status: VersionStatus,
    pub sharing: VersionSharing,
}

impl NewVersion {
    /// Creates an open, unshared version.
    pub fn new(project_id: i64, name: impl Into<String>) -> Self {
        NewVersion {
            project_id,
            name: name.into(),
            description: None,
            effective_date: None,
            status: VersionStatus::Open,
            sharing: VersionSharing::None,
        }
    }

    /// Sets the effective date (builder pattern).
    pub fn with_effective_date(mut self, date: NaiveDate) -> Self {
        self.effective_date = Some(date);
        self
    }

    /// Sets the sharing mode (builder pattern).
    pub fn with_sharing(mut self, sharing: VersionSharing) -> Self {
        self.sharing = sharing;
        self
    }
}

/// Compact id/name pair, used in `VersionNotAssignable` diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRef {
    pub id: i64,
    pub name: String,
}

/// Policy for assignments to locked or closed versions.
///
/// The host system was inconsistent about this, so it is configuration here
/// rather than a fixed rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedVersionPolicy {
    /// Record a warning in the outcome, apply the assignment.
    #[default]
    Warn,
    /// Fail the assignment with `VersionLocked`.
    Reject,
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
