// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: IPC messages in, engine calls out.
//!
//! Subscribe and Shutdown are connection-lifecycle concerns and are handled
//! in the accept loop; everything else lands here. Internal errors are
//! logged with a correlation id and surfaced only as a generic failure plus
//! that id.

use std::time::Instant;

use grid_core::engine::MutationEngine;
use grid_core::error::Error;
use grid_core::events::Cursor;
use grid_ipc::{DaemonRequest, DaemonResponse, DaemonStatus, MutateOp, QueryOp};

/// Map an engine error to a wire response.
pub fn error_response(err: &Error) -> DaemonResponse {
    let code = err.code();
    if code == "internal_error" {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(correlation_id = %correlation_id, error = %err, "internal error");
        return DaemonResponse::Error {
            code: code.to_string(),
            message: "an internal error occurred".to_string(),
            correlation_id: Some(correlation_id),
        };
    }
    DaemonResponse::Error {
        code: code.to_string(),
        message: err.to_string(),
        correlation_id: None,
    }
}

fn ok_or_error<T>(result: Result<T, Error>, into: impl FnOnce(T) -> DaemonResponse) -> DaemonResponse {
    match result {
        Ok(value) => into(value),
        Err(err) => error_response(&err),
    }
}

/// Handle every request except Subscribe and Shutdown.
pub fn handle_request(
    engine: &MutationEngine,
    request: DaemonRequest,
    started: &Instant,
) -> DaemonResponse {
    match request {
        DaemonRequest::Ping => DaemonResponse::Pong,
        DaemonRequest::Status => {
            let pid = std::process::id();
            let uptime_secs = started.elapsed().as_secs();
            DaemonResponse::Status(DaemonStatus::new(pid, uptime_secs))
        }
        DaemonRequest::Shutdown => DaemonResponse::ShuttingDown,
        DaemonRequest::Hello { version: _ } => DaemonResponse::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        DaemonRequest::Heartbeat { session_id } => ok_or_error(
            engine.heartbeat(&session_id),
            |valid_until| DaemonResponse::HeartbeatAck { valid_until },
        ),
        DaemonRequest::Unsubscribe { session_id } => DaemonResponse::Unsubscribed {
            removed: engine.unsubscribe(&session_id),
        },
        DaemonRequest::Poll {
            project_id,
            since,
            limit,
        } => ok_or_error(
            engine.poll_events(
                project_id,
                since.unwrap_or_else(Cursor::origin),
                limit.unwrap_or(0),
            ),
            DaemonResponse::Poll,
        ),
        DaemonRequest::Subscribe { .. } => {
            // The accept loop intercepts Subscribe before dispatch.
            DaemonResponse::Error {
                code: "validation_failed".to_string(),
                message: "subscribe must open its own connection".to_string(),
                correlation_id: None,
            }
        }
        DaemonRequest::Query(op) => handle_query(engine, op),
        DaemonRequest::Mutate(op) => handle_mutate(engine, op),
    }
}

fn handle_query(engine: &MutationEngine, op: QueryOp) -> DaemonResponse {
    match op {
        QueryOp::GetIssue { id } => ok_or_error(engine.db().get_issue(id), DaemonResponse::Issue),
        QueryOp::ListIssues {
            project_id,
            include_deleted,
        } => ok_or_error(
            engine.db().list_issues(project_id, include_deleted),
            |issues| DaemonResponse::Issues { issues },
        ),
        QueryOp::GetVersion { id } => {
            ok_or_error(engine.db().get_version(id), DaemonResponse::Version)
        }
        QueryOp::ListVersions { project_id } => ok_or_error(
            engine.db().project_versions(project_id),
            |versions| DaemonResponse::Versions { versions },
        ),
        QueryOp::AssignableVersions { project_id } => ok_or_error(
            engine.db().assignable_versions(project_id),
            |versions| DaemonResponse::Versions { versions },
        ),
        QueryOp::CalculateImpact {
            issue_id,
            update_parent,
        } => ok_or_error(
            engine.calculate_impact(issue_id, update_parent),
            DaemonResponse::Impact,
        ),
        QueryOp::CheckConsistency { project_id } => ok_or_error(
            engine.check_version_consistency(project_id),
            DaemonResponse::Consistency,
        ),
        QueryOp::OperationHistory { project_id, filter } => ok_or_error(
            engine.operation_history(project_id, &filter),
            |entries| DaemonResponse::History { entries },
        ),
        QueryOp::ActiveSessions { project_id } => DaemonResponse::Sessions {
            sessions: engine.active_sessions(project_id),
        },
    }
}

fn handle_mutate(engine: &MutationEngine, op: MutateOp) -> DaemonResponse {
    match op {
        MutateOp::CreateIssue { new, actor } => {
            ok_or_error(engine.create_issue(new, &actor), DaemonResponse::Issue)
        }
        MutateOp::UpdateIssue { id, update, actor } => {
            ok_or_error(engine.update_issue(id, update, &actor), DaemonResponse::Issue)
        }
        MutateOp::MoveIssue { id, request, actor } => {
            ok_or_error(engine.move_issue(id, request, &actor), DaemonResponse::Moved)
        }
        MutateOp::AssignVersion {
            issue_id,
            version_id,
            request,
            actor,
        } => ok_or_error(
            engine.assign_version(issue_id, version_id, request, &actor),
            |outcome| DaemonResponse::VersionChanged(Box::new(outcome)),
        ),
        MutateOp::BatchUpdate {
            project_id,
            items,
            fields,
            actor,
        } => ok_or_error(
            engine.batch_update(project_id, &items, &fields, &actor),
            DaemonResponse::Batch,
        ),
        MutateOp::BatchAssignVersion {
            project_id,
            items,
            version_id,
            propagate_to_children,
            force_update,
            actor,
        } => ok_or_error(
            engine.batch_assign_version(
                project_id,
                &items,
                version_id,
                propagate_to_children,
                force_update,
                &actor,
            ),
            DaemonResponse::VersionAssignBatch,
        ),
        MutateOp::BatchTransitionStatus {
            project_id,
            items,
            target,
            workflow_validation,
            actor,
        } => ok_or_error(
            engine.batch_transition_status(project_id, &items, target, workflow_validation, &actor),
            DaemonResponse::StatusTransition,
        ),
        MutateOp::BatchAdjustPriorities {
            project_id,
            adjustments,
            actor,
        } => ok_or_error(
            engine.batch_adjust_priorities(project_id, &adjustments, &actor),
            DaemonResponse::Batch,
        ),
        MutateOp::SoftDelete {
            project_id,
            items,
            reason,
            actor,
        } => ok_or_error(
            engine.soft_delete(project_id, &items, reason, &actor),
            DaemonResponse::SoftDeleted,
        ),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
