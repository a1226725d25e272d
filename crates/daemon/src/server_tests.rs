// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use grid_core::issue::{Actor, NewIssue, Role, Tracker};
use grid_core::{Database, EngineConfig};
use grid_ipc::MutateOp;

fn engine_with_project() -> (MutationEngine, i64) {
    let db = Database::open_in_memory().unwrap();
    let project = db.create_project("grid", "Grid", None).unwrap();
    let project_id = project.id;
    (MutationEngine::new(db, EngineConfig::default()), project_id)
}

fn alice() -> Actor {
    Actor::user(1, "alice", Role::Manager)
}

#[test]
fn ping_pongs() {
    let (engine, _) = engine_with_project();
    let response = handle_request(&engine, DaemonRequest::Ping, &Instant::now());
    assert_eq!(response, DaemonResponse::Pong);
}

#[test]
fn status_reports_pid() {
    let (engine, _) = engine_with_project();
    let response = handle_request(&engine, DaemonRequest::Status, &Instant::now());
    match response {
        DaemonResponse::Status(status) => assert_eq!(status.pid, std::process::id()),
        other => panic!("expected status, got {other:?}"),
    }
}

#[test]
fn hello_answers_with_build_version() {
    let (engine, _) = engine_with_project();
    let response = handle_request(
        &engine,
        DaemonRequest::Hello {
            version: "0.0.1".to_string(),
        },
        &Instant::now(),
    );
    assert_eq!(
        response,
        DaemonResponse::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    );
}

#[test]
fn create_and_get_issue_through_dispatch() {
    let (engine, project_id) = engine_with_project();
    let created = handle_request(
        &engine,
        DaemonRequest::Mutate(MutateOp::CreateIssue {
            new: NewIssue::new(project_id, Tracker::Feature, "dispatched"),
            actor: alice(),
        }),
        &Instant::now(),
    );
    let issue = match created {
        DaemonResponse::Issue(issue) => issue,
        other => panic!("expected issue, got {other:?}"),
    };

    let fetched = handle_request(
        &engine,
        DaemonRequest::Query(QueryOp::GetIssue { id: issue.id }),
        &Instant::now(),
    );
    assert_eq!(fetched, DaemonResponse::Issue(issue));
}

#[test]
fn errors_carry_stable_codes() {
    let (engine, _) = engine_with_project();
    let response = handle_request(
        &engine,
        DaemonRequest::Query(QueryOp::GetIssue { id: 404 }),
        &Instant::now(),
    );
    match response {
        DaemonResponse::Error {
            code,
            correlation_id,
            ..
        } => {
            assert_eq!(code, "not_found");
            assert!(correlation_id.is_none());
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn internal_errors_get_a_correlation_id_and_generic_message() {
    let err = grid_core::Error::Internal {
        correlation_id: "ignored".to_string(),
    };
    match error_response(&err) {
        DaemonResponse::Error {
            code,
            message,
            correlation_id,
        } => {
            assert_eq!(code, "internal_error");
            assert_eq!(message, "an internal error occurred");
            assert!(correlation_id.is_some());
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn poll_defaults_to_origin_cursor() {
    let (engine, project_id) = engine_with_project();
    handle_request(
        &engine,
        DaemonRequest::Mutate(MutateOp::CreateIssue {
            new: NewIssue::new(project_id, Tracker::Task, "t"),
            actor: alice(),
        }),
        &Instant::now(),
    );

    let response = handle_request(
        &engine,
        DaemonRequest::Poll {
            project_id,
            since: None,
            limit: None,
        },
        &Instant::now(),
    );
    match response {
        DaemonResponse::Poll(page) => {
            assert_eq!(page.events.len(), 1);
            assert!(!page.has_more);
        }
        other => panic!("expected poll page, got {other:?}"),
    }
}

#[test]
fn heartbeat_unknown_session_is_not_found() {
    let (engine, _) = engine_with_project();
    let response = handle_request(
        &engine,
        DaemonRequest::Heartbeat {
            session_id: "missing".to_string(),
        },
        &Instant::now(),
    );
    match response {
        DaemonResponse::Error { code, .. } => assert_eq!(code, "not_found"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn unsubscribe_reports_missing_sessions() {
    let (engine, _) = engine_with_project();
    let response = handle_request(
        &engine,
        DaemonRequest::Unsubscribe {
            session_id: "missing".to_string(),
        },
        &Instant::now(),
    );
    assert_eq!(response, DaemonResponse::Unsubscribed { removed: false });
}

#[test]
fn subscribe_over_dispatch_is_rejected() {
    let (engine, project_id) = engine_with_project();
    let response = handle_request(
        &engine,
        DaemonRequest::Subscribe {
            project_id,
            actor: alice(),
        },
        &Instant::now(),
    );
    match response {
        DaemonResponse::Error { code, .. } => assert_eq!(code, "validation_failed"),
        other => panic!("expected error, got {other:?}"),
    }
}
