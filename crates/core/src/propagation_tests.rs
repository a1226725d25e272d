// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::Error;
use crate::issue::{NewIssue, Role, Tracker};
use crate::version::NewVersion;
use chrono::NaiveDate;

fn fixture() -> (Database, i64) {
    let db = Database::open_in_memory().unwrap();
    let project = db.create_project("grid", "Grid", None).unwrap();
    (db, project.id)
}

fn alice() -> Actor {
    Actor::user(1, "alice", Role::Developer)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn assign_version_rejects_unknown_issue() {
    let (db, _project_id) = fixture();
    let err = assign_version(
        &db,
        404,
        None,
        AssignVersionRequest::default(),
        &alice(),
        &EngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::IssueNotFound(404)));
}

#[test]
fn assign_version_rejects_unknown_version() {
    let (db, project_id) = fixture();
    let task = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t"))
        .unwrap();
    let err = assign_version(
        &db,
        task.id,
        Some(404),
        AssignVersionRequest::default(),
        &alice(),
        &EngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::VersionNotFound(404)));
}

#[test]
fn fan_out_stays_below_the_dragged_issue() {
    let (db, project_id) = fixture();
    let version = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 7, 1)))
        .unwrap();
    let feature = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Feature, "f"))
        .unwrap();
    let story = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "s").with_parent(feature.id),
        )
        .unwrap();
    let sibling = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "sib").with_parent(feature.id),
        )
        .unwrap();
    let task = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t").with_parent(story.id))
        .unwrap();

    let outcome = assign_version(
        &db,
        story.id,
        Some(version.id),
        AssignVersionRequest::default(),
        &alice(),
        &EngineConfig::default(),
    )
    .unwrap();

    // The story and its own child are updated; sibling and parent are not.
    let updated: Vec<i64> = outcome.updated_children.iter().map(|c| c.id).collect();
    assert_eq!(updated, vec![task.id]);
    assert_eq!(db.get_issue(sibling.id).unwrap().version_id, None);
    assert_eq!(db.get_issue(feature.id).unwrap().version_id, None);
}

#[test]
fn clearing_a_version_cascades_the_clear() {
    let (db, project_id) = fixture();
    let version = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 7, 1)))
        .unwrap();
    let story = db
        .insert_issue(&NewIssue::new(project_id, Tracker::UserStory, "s"))
        .unwrap();
    let task = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t").with_parent(story.id))
        .unwrap();

    assign_version(
        &db,
        story.id,
        Some(version.id),
        AssignVersionRequest::default(),
        &alice(),
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(db.get_issue(task.id).unwrap().version_id, Some(version.id));

    assign_version(
        &db,
        story.id,
        None,
        AssignVersionRequest::default(),
        &alice(),
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(db.get_issue(story.id).unwrap().version_id, None);
    assert_eq!(db.get_issue(task.id).unwrap().version_id, None);
}

#[test]
fn consistency_report_flags_missing_and_mismatch() {
    let (db, project_id) = fixture();
    let v1 = db.create_version(&NewVersion::new(project_id, "v1")).unwrap();
    let v2 = db.create_version(&NewVersion::new(project_id, "v2")).unwrap();

    let feature = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::Feature, "f").with_version(v1.id),
        )
        .unwrap();
    let missing = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "m").with_parent(feature.id),
        )
        .unwrap();
    let diverged = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "d")
                .with_parent(feature.id)
                .with_version(v2.id),
        )
        .unwrap();
    let aligned = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "a")
                .with_parent(feature.id)
                .with_version(v1.id),
        )
        .unwrap();

    let report = check_version_consistency(&db, project_id).unwrap();
    assert!(!report.consistent);
    assert_eq!(report.stats.total_issues, 4);
    assert_eq!(report.stats.missing, 1);
    assert_eq!(report.stats.mismatched, 1);

    let missing_finding = report
        .findings
        .iter()
        .find(|f| f.child_id == missing.id)
        .unwrap();
    assert_eq!(missing_finding.kind, DivergenceKind::Missing);

    let diverged_finding = report
        .findings
        .iter()
        .find(|f| f.child_id == diverged.id)
        .unwrap();
    assert_eq!(diverged_finding.kind, DivergenceKind::Mismatch);
    assert_eq!(diverged_finding.child_version_id, Some(v2.id));

    assert!(!report.findings.iter().any(|f| f.child_id == aligned.id));
}

#[test]
fn consistency_report_is_clean_for_empty_projects() {
    let (db, project_id) = fixture();
    let report = check_version_consistency(&db, project_id).unwrap();
    assert!(report.consistent);
    assert_eq!(report.stats.total_issues, 0);
}
