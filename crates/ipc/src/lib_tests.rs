// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use grid_core::events::{ChangeType, ResourceType};
use grid_core::issue::{Role, Tracker};
use std::io::Cursor as IoCursor;

fn round_trip_request(request: &DaemonRequest) -> DaemonRequest {
    let mut buf = Vec::new();
    framing::write_request(&mut buf, request).unwrap();
    framing::read_request(&mut IoCursor::new(buf)).unwrap()
}

fn round_trip_response(response: &DaemonResponse) -> DaemonResponse {
    let mut buf = Vec::new();
    framing::write_response(&mut buf, response).unwrap();
    framing::read_response(&mut IoCursor::new(buf)).unwrap()
}

#[test]
fn ping_round_trip() {
    assert_eq!(round_trip_request(&DaemonRequest::Ping), DaemonRequest::Ping);
    assert_eq!(round_trip_response(&DaemonResponse::Pong), DaemonResponse::Pong);
}

#[test]
fn request_json_uses_type_tags() {
    let json = serde_json::to_string(&DaemonRequest::Hello {
        version: "0.3.0".to_string(),
    })
    .unwrap();
    assert!(json.contains("\"type\":\"Hello\""));
}

#[test]
fn mutate_round_trip() {
    let request = DaemonRequest::Mutate(MutateOp::MoveIssue {
        id: 7,
        request: MoveRequest::to_cell(Some(1), Some(2)).with_expected_lock(3),
        actor: Actor::user(1, "alice", Role::Manager),
    });
    assert_eq!(round_trip_request(&request), request);
}

#[test]
fn batch_request_round_trip() {
    let request = DaemonRequest::Mutate(MutateOp::BatchAssignVersion {
        project_id: 1,
        items: vec![
            BatchItem::from(1),
            BatchItem {
                id: 2,
                expected_lock_version: Some(4),
            },
        ],
        version_id: Some(9),
        propagate_to_children: true,
        force_update: false,
        actor: Actor::automation("issue-bot"),
    });
    assert_eq!(round_trip_request(&request), request);
}

#[test]
fn poll_request_with_cursor() {
    let request = DaemonRequest::Poll {
        project_id: 3,
        since: Some(Cursor::new(1000, 5)),
        limit: Some(50),
    };
    assert_eq!(round_trip_request(&request), request);
}

#[test]
fn create_issue_round_trip() {
    let request = DaemonRequest::Mutate(MutateOp::CreateIssue {
        new: NewIssue::new(1, Tracker::Feature, "f").with_parent(2),
        actor: Actor::user(1, "alice", Role::Manager),
    });
    assert_eq!(round_trip_request(&request), request);
}

#[test]
fn error_response_carries_code_and_correlation() {
    let response = DaemonResponse::Error {
        code: "internal_error".to_string(),
        message: "unexpected failure".to_string(),
        correlation_id: Some("9b2e".to_string()),
    };
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"code\":\"internal_error\""));
    assert!(json.contains("9b2e"));
    assert_eq!(round_trip_response(&response), response);
}

#[test]
fn push_frame_round_trip() {
    let event = ChangeEvent {
        cursor: Cursor::new(99, 1),
        project_id: 1,
        change_type: ChangeType::IssueMoved,
        resource_type: ResourceType::Issue,
        resource_id: 5,
        lock_version: Some(2),
        actor: "alice".to_string(),
        timestamp: Cursor::new(99, 1).timestamp(),
        payload: serde_json::json!({"version_id": 4}),
    };
    let mut buf = Vec::new();
    framing::write_frame(&mut buf, &PushFrame::Event(event.clone())).unwrap();
    let frame = framing::read_frame(&mut IoCursor::new(buf)).unwrap();
    assert_eq!(frame, PushFrame::Event(event));

    let mut buf = Vec::new();
    framing::write_frame(&mut buf, &PushFrame::Expired).unwrap();
    assert_eq!(
        framing::read_frame(&mut IoCursor::new(buf)).unwrap(),
        PushFrame::Expired
    );
}

#[test]
fn oversized_frame_is_rejected() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&u32::to_be_bytes(2 * 1024 * 1024));
    buf.extend_from_slice(&[0u8; 16]);
    assert!(framing::read_request(&mut IoCursor::new(buf)).is_err());
}

#[test]
fn truncated_frame_is_rejected() {
    let request = DaemonRequest::Ping;
    let mut buf = Vec::new();
    framing::write_request(&mut buf, &request).unwrap();
    buf.truncate(buf.len() - 1);
    assert!(framing::read_request(&mut IoCursor::new(buf)).is_err());
}
