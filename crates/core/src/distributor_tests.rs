// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::db::Database;
use crate::events::{ChangeType, ResourceType};
use crate::issue::Role;
use std::collections::HashSet;

fn fixture() -> (Database, ChangeDistributor, i64) {
    let db = Database::open_in_memory().unwrap();
    let project = db.create_project("grid", "Grid", None).unwrap();
    let distributor = ChangeDistributor::new(Duration::minutes(30));
    (db, distributor, project.id)
}

fn alice() -> Actor {
    Actor::user(1, "alice", Role::Developer)
}

fn record(resource_id: i64) -> EventRecord {
    EventRecord {
        change_type: ChangeType::IssueUpdated,
        resource_type: ResourceType::Issue,
        resource_id,
        lock_version: Some(1),
        actor: "alice".to_string(),
        payload: serde_json::json!({}),
    }
}

#[test]
fn publish_reaches_matching_subscribers() {
    let (db, distributor, project_id) = fixture();
    let (_session, receiver) = distributor.subscribe(project_id, &alice());

    let published = distributor.publish(&db, project_id, record(7)).unwrap();
    let received = receiver.recv().unwrap();
    assert_eq!(received, published);
    assert_eq!(received.resource_id, 7);
    assert_eq!(received.lock_version, Some(1));
}

#[test]
fn publish_skips_other_projects() {
    let (db, distributor, project_id) = fixture();
    let other = db.create_project("other", "Other", None).unwrap();
    let (_session, receiver) = distributor.subscribe(other.id, &alice());

    distributor.publish(&db, project_id, record(7)).unwrap();
    assert!(receiver.try_recv().is_err());
}

#[test]
fn dropped_receiver_is_collected_on_publish() {
    let (db, distributor, project_id) = fixture();
    let (session, receiver) = distributor.subscribe(project_id, &alice());
    drop(receiver);

    distributor.publish(&db, project_id, record(1)).unwrap();
    assert!(!distributor.is_subscribed(&session));
}

#[test]
fn poll_pages_and_next_cursor() {
    let (db, distributor, project_id) = fixture();
    for i in 0..5 {
        distributor.publish(&db, project_id, record(i)).unwrap();
    }

    let page = distributor.poll(&db, project_id, Cursor::origin(), 3).unwrap();
    assert_eq!(page.events.len(), 3);
    assert!(page.has_more);

    let rest = distributor.poll(&db, project_id, page.next_cursor, 10).unwrap();
    assert_eq!(rest.events.len(), 2);
    assert!(!rest.has_more);
    // Empty tail keeps the cursor stable.
    let tail = distributor.poll(&db, project_id, rest.next_cursor, 10).unwrap();
    assert!(tail.events.is_empty());
    assert_eq!(tail.next_cursor, rest.next_cursor);
}

#[test]
fn two_hop_poll_equals_one_hop_union() {
    let (db, distributor, project_id) = fixture();
    for i in 0..6 {
        distributor.publish(&db, project_id, record(i)).unwrap();
    }

    let one_hop = distributor.poll(&db, project_id, Cursor::origin(), 100).unwrap();

    let hop1 = distributor.poll(&db, project_id, Cursor::origin(), 4).unwrap();
    let hop2 = distributor.poll(&db, project_id, hop1.next_cursor, 100).unwrap();

    let union: Vec<Cursor> = hop1
        .events
        .iter()
        .chain(hop2.events.iter())
        .map(|e| e.cursor)
        .collect();
    let single: Vec<Cursor> = one_hop.events.iter().map(|e| e.cursor).collect();
    assert_eq!(union, single);

    // Deduplicated: no cursor appears twice across the two hops.
    let unique: HashSet<Cursor> = union.iter().copied().collect();
    assert_eq!(unique.len(), union.len());
}

#[test]
fn heartbeat_extends_and_unknown_session_errors() {
    let (_db, distributor, project_id) = fixture();
    let (session, _receiver) = distributor.subscribe(project_id, &alice());

    let valid_until = distributor.heartbeat(&session).unwrap();
    assert!(valid_until > Utc::now());
    assert!(matches!(
        distributor.heartbeat("missing").unwrap_err(),
        Error::SessionNotFound(_)
    ));
}

#[test]
fn unsubscribe_removes_session() {
    let (_db, distributor, project_id) = fixture();
    let (session, _receiver) = distributor.subscribe(project_id, &alice());
    assert!(distributor.unsubscribe(&session));
    assert!(!distributor.unsubscribe(&session));
    assert!(!distributor.is_subscribed(&session));
}

#[test]
fn expired_sessions_are_pruned() {
    let (_db, _unused, project_id) = fixture();
    // Zero TTL: every session is expired as soon as it exists.
    let distributor = ChangeDistributor::new(Duration::minutes(0));
    let (_s1, _r1) = distributor.subscribe(project_id, &alice());
    let (_s2, _r2) = distributor.subscribe(project_id, &alice());
    assert_eq!(distributor.prune_expired(), 2);
    assert!(distributor.active_sessions(project_id).is_empty());
}

#[test]
fn active_sessions_report_state() {
    let (_db, distributor, project_id) = fixture();
    let (session, _receiver) = distributor.subscribe(project_id, &alice());

    let sessions = distributor.active_sessions(project_id);
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, session);
    assert_eq!(sessions[0].actor, "alice");
    assert_eq!(sessions[0].state, SessionState::Active);
}
