// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal project model.
//!
//! Projects exist here for two reasons: the assignable-version query walks
//! the project ancestry, and change events are partitioned per project.

use serde::{Deserialize, Serialize};

/// A project owning issues and versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    /// Short stable identifier (URL-safe).
    pub identifier: String,
    pub name: String,
    /// Parent project, for version inheritance in sub-projects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}
