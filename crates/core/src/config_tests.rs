// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::version::LockedVersionPolicy;

#[test]
fn defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.batch_limit, 100);
    assert_eq!(config.hours_per_day, 8.0);
    assert_eq!(config.min_duration_days, 1);
    assert_eq!(config.event_retention_hours, 24);
    assert_eq!(config.session_ttl_minutes, 30);
    assert_eq!(config.locked_version_policy, LockedVersionPolicy::Warn);
}

#[test]
fn partial_config_fills_defaults() {
    let config: EngineConfig =
        serde_json::from_str(r#"{"batch_limit": 25, "locked_version_policy": "reject"}"#).unwrap();
    assert_eq!(config.batch_limit, 25);
    assert_eq!(config.locked_version_policy, LockedVersionPolicy::Reject);
    assert_eq!(config.session_ttl_minutes, 30);
}

#[test]
fn empty_config_is_default() {
    let config: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
}
