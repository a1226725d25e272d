// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! grid-core: version propagation and concurrent mutation engine.
//!
//! This crate provides the data model, hierarchy and workflow policies, the
//! version/date cascade, the optimistic-concurrency guard, the mutation
//! engine, and change distribution to push and pull observers. The daemon
//! crate hosts it behind an IPC surface.

pub mod config;
pub mod dates;
pub mod db;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod hierarchy;
pub mod issue;
pub mod project;
pub mod propagation;
pub mod version;
pub mod workflow;

pub use config::EngineConfig;
pub use dates::{
    CascadeOptions, ImpactSummary, ParentSkipReason, ScheduleDates, SkipReason, SkippedChild,
    VersionChangeOutcome,
};
pub use db::Database;
pub use distributor::{ChangeDistributor, PollPage, SessionInfo, SessionState};
pub use engine::{
    BatchFailure, BatchHistoryEntry, BatchItem, BatchOutcome, BatchSummary, BatchUpdateFields,
    FieldDelta, HistoryFilter, Housekeeping, IssueUpdate, MoveOutcome, MoveRequest,
    MutationEngine, PriorityAdjustment, PropagationSummary, SoftDeleteOutcome,
    StatusTransitionOutcome, VersionAssignOutcome, WorkflowViolationDetail,
};
pub use error::{Error, Result};
pub use events::{ChangeEvent, ChangeType, Cursor, EventRecord, EventStore, ResourceType};
pub use issue::{
    Actor, Issue, NewIssue, Priority, Relation, RelationKind, Role, Status, Tracker,
};
pub use project::Project;
pub use propagation::{AssignVersionRequest, ConsistencyReport};
pub use version::{
    LockedVersionPolicy, NewVersion, Version, VersionRef, VersionSharing, VersionStatus,
};
