// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Every field has a default so a config file may set only what it cares
//! about. The daemon deserializes this from TOML in its state directory.

use serde::{Deserialize, Serialize};

use crate::version::LockedVersionPolicy;

/// Tunable limits and policies for the mutation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on batch size; larger requests are rejected before any work.
    pub batch_limit: usize,
    /// Working hours per day, for estimated-hours to duration conversion.
    pub hours_per_day: f64,
    /// Minimum derived duration in days.
    pub min_duration_days: i64,
    /// Change events older than this are pruned.
    pub event_retention_hours: i64,
    /// Push sessions without a heartbeat for this long are garbage-collected.
    pub session_ttl_minutes: i64,
    /// What to do when an issue is assigned to a locked/closed version.
    pub locked_version_policy: LockedVersionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_limit: 100,
            hours_per_day: 8.0,
            min_duration_days: 1,
            event_retention_hours: 24,
            session_ttl_minutes: 30,
            locked_version_policy: LockedVersionPolicy::Warn,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
