// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    epic = { "epic", Tracker::Epic },
    feature = { "feature", Tracker::Feature },
    user_story = { "user_story", Tracker::UserStory },
    user_story_compact = { "UserStory", Tracker::UserStory },
    task = { "task", Tracker::Task },
    test_tracker = { "test", Tracker::Test },
    bug = { "bug", Tracker::Bug },
)]
fn tracker_from_str(input: &str, expected: Tracker) {
    assert_eq!(input.parse::<Tracker>().unwrap(), expected);
}

#[test]
fn tracker_from_str_invalid() {
    let err = "gadget".parse::<Tracker>().unwrap_err();
    assert!(matches!(err, Error::InvalidTracker(_)));
}

#[parameterized(
    new = { Status::New, "new" },
    ready = { Status::Ready, "ready" },
    in_progress = { Status::InProgress, "in_progress" },
    review = { Status::Review, "review" },
    testing = { Status::Testing, "testing" },
    resolved = { Status::Resolved, "resolved" },
    closed = { Status::Closed, "closed" },
)]
fn status_round_trip(status: Status, text: &str) {
    assert_eq!(status.as_str(), text);
    assert_eq!(text.parse::<Status>().unwrap(), status);
}

#[test]
fn status_column_order_is_monotonic() {
    let flow = [
        Status::New,
        Status::Ready,
        Status::InProgress,
        Status::Review,
        Status::Testing,
        Status::Resolved,
        Status::Closed,
    ];
    for pair in flow.windows(2) {
        assert!(pair[0].column_order() < pair[1].column_order());
    }
}

#[test]
fn terminal_statuses() {
    assert!(Status::Resolved.is_terminal());
    assert!(Status::Closed.is_terminal());
    assert!(!Status::Testing.is_terminal());
}

#[parameterized(
    low = { "low", Priority::Low },
    normal = { "normal", Priority::Normal },
    high = { "high", Priority::High },
    urgent = { "urgent", Priority::Urgent },
    immediate = { "immediate", Priority::Immediate },
)]
fn priority_from_str(input: &str, expected: Priority) {
    assert_eq!(input.parse::<Priority>().unwrap(), expected);
}

#[test]
fn priority_ordering() {
    assert!(Priority::Immediate > Priority::Urgent);
    assert!(Priority::Normal > Priority::Low);
}

#[test]
fn actor_constructors() {
    let user = Actor::user(7, "alice", Role::Manager);
    assert!(!user.automation);
    assert_eq!(user.role, Role::Manager);

    let bot = Actor::automation("issue-bot");
    assert!(bot.automation);
    assert_eq!(bot.id, 0);
}

#[test]
fn new_issue_builder() {
    let new = NewIssue::new(1, Tracker::Feature, "Ship it")
        .with_parent(3)
        .with_version(9)
        .with_estimated_hours(16.0);
    assert_eq!(new.parent_id, Some(3));
    assert_eq!(new.version_id, Some(9));
    assert_eq!(new.estimated_hours, Some(16.0));
    assert_eq!(new.status, Status::New);
    assert_eq!(new.priority, Priority::Normal);
}

#[test]
fn issue_serde_skips_empty_options() {
    let new = NewIssue::new(1, Tracker::Task, "t");
    let json = serde_json::to_string(&new).unwrap();
    assert!(!json.contains("parent_id"));
    assert!(json.contains("\"tracker\":\"task\""));
}

#[test]
fn relation_kind_round_trip() {
    assert_eq!("blocks".parse::<RelationKind>().unwrap(), RelationKind::Blocks);
    assert_eq!("relates".parse::<RelationKind>().unwrap(), RelationKind::Relates);
    assert!("follows".parse::<RelationKind>().is_err());
}
