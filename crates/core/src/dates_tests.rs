// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use crate::issue::{NewIssue, Role, Tracker};
use crate::version::{NewVersion, VersionStatus};
use chrono::NaiveDate;
use yare::parameterized;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fixture() -> (Database, i64) {
    let db = Database::open_in_memory().unwrap();
    let project = db.create_project("grid", "Grid", None).unwrap();
    (db, project.id)
}

fn human() -> Actor {
    Actor::user(1, "alice", Role::Manager)
}

#[parameterized(
    no_estimate = { None, 1 },
    half_day = { Some(4.0), 1 },
    one_day = { Some(8.0), 1 },
    ten_hours = { Some(10.0), 2 },
    two_weeks = { Some(80.0), 10 },
)]
fn duration_from_estimate(hours: Option<f64>, expected_days: i64) {
    let config = EngineConfig::default();
    assert_eq!(estimated_duration_days(hours, &config), expected_days);
}

#[test]
fn compute_dates_is_nil_safe() {
    let (db, project_id) = fixture();
    let undated = db.create_version(&NewVersion::new(project_id, "undated")).unwrap();
    let issue = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t"))
        .unwrap();
    assert!(compute_dates(&issue, &undated, &EngineConfig::default()).is_none());
}

#[test]
fn compute_dates_derives_start_from_estimate() {
    let (db, project_id) = fixture();
    let version = db
        .create_version(
            &NewVersion::new(project_id, "v1").with_effective_date(date(2026, 9, 30)),
        )
        .unwrap();
    let issue = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::Task, "t").with_estimated_hours(24.0),
        )
        .unwrap();

    let dates = compute_dates(&issue, &version, &EngineConfig::default()).unwrap();
    assert_eq!(dates.due, date(2026, 9, 30));
    assert_eq!(dates.start, date(2026, 9, 27));
}

#[test]
fn compute_dates_keeps_later_existing_start_but_clamps_to_due() {
    let (db, project_id) = fixture();
    let version = db
        .create_version(
            &NewVersion::new(project_id, "v1").with_effective_date(date(2026, 9, 30)),
        )
        .unwrap();
    let mut issue = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t"))
        .unwrap();

    issue.start_date = Some(date(2026, 9, 29));
    let dates = compute_dates(&issue, &version, &EngineConfig::default()).unwrap();
    assert_eq!(dates.start, date(2026, 9, 29));

    issue.start_date = Some(date(2026, 10, 15));
    let dates = compute_dates(&issue, &version, &EngineConfig::default()).unwrap();
    assert_eq!(dates.start, date(2026, 9, 30));
    assert!(dates.start <= dates.due);
}

#[test]
fn change_version_assigns_issue_and_children() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let version = db
        .create_version(&NewVersion::new(project_id, "v2").with_effective_date(date(2026, 9, 1)))
        .unwrap();
    let feature = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Feature, "f"))
        .unwrap();
    let story = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "s").with_parent(feature.id),
        )
        .unwrap();
    let task = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t").with_parent(story.id))
        .unwrap();

    let outcome = change_version_with_dates(
        &db,
        feature.id,
        Some(&version),
        None,
        CascadeOptions::default(),
        &human(),
        &config,
    )
    .unwrap();

    assert!(outcome.issue_changed);
    assert_eq!(outcome.issue.version_id, Some(version.id));
    assert_eq!(outcome.issue.due_date, Some(date(2026, 9, 1)));
    let updated: Vec<i64> = outcome.updated_children.iter().map(|c| c.id).collect();
    assert!(updated.contains(&story.id));
    assert!(updated.contains(&task.id));
    assert_eq!(db.get_issue(task.id).unwrap().version_id, Some(version.id));
}

#[test]
fn change_version_is_idempotent() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let version = db
        .create_version(&NewVersion::new(project_id, "v2").with_effective_date(date(2026, 9, 1)))
        .unwrap();
    let feature = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Feature, "f"))
        .unwrap();
    let story = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "s").with_parent(feature.id),
        )
        .unwrap();

    let first = change_version_with_dates(
        &db,
        feature.id,
        Some(&version),
        None,
        CascadeOptions::default(),
        &human(),
        &config,
    )
    .unwrap();
    assert!(first.issue_changed);
    let after_first = db.get_issue(story.id).unwrap();

    let second = change_version_with_dates(
        &db,
        feature.id,
        Some(&version),
        None,
        CascadeOptions::default(),
        &human(),
        &config,
    )
    .unwrap();
    assert!(!second.issue_changed);
    assert!(second.updated_children.is_empty());
    assert_eq!(db.get_issue(story.id).unwrap(), after_first);
}

#[test]
fn pinned_child_is_skipped_unless_forced() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let v1 = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 6, 1)))
        .unwrap();
    let v2 = db
        .create_version(&NewVersion::new(project_id, "v2").with_effective_date(date(2026, 9, 1)))
        .unwrap();
    let feature = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Feature, "f"))
        .unwrap();
    let pinned = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "pinned").with_parent(feature.id),
        )
        .unwrap();
    let unpinned = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "free").with_parent(feature.id),
        )
        .unwrap();

    // A human pins the first story to v1.
    change_version_with_dates(
        &db,
        pinned.id,
        Some(&v1),
        None,
        CascadeOptions {
            propagate_to_children: false,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();
    assert!(db.get_issue(pinned.id).unwrap().version_pinned);

    // Non-forced cascade from the feature: the pinned story keeps v1.
    let outcome = change_version_with_dates(
        &db,
        feature.id,
        Some(&v2),
        None,
        CascadeOptions::default(),
        &human(),
        &config,
    )
    .unwrap();
    assert_eq!(db.get_issue(pinned.id).unwrap().version_id, Some(v1.id));
    assert_eq!(db.get_issue(unpinned.id).unwrap().version_id, Some(v2.id));
    assert_eq!(
        outcome.skipped_children,
        vec![SkippedChild {
            id: pinned.id,
            reason: SkipReason::ManuallyPinned,
        }]
    );

    // Forced cascade overwrites the pin and clears it.
    let forced = change_version_with_dates(
        &db,
        feature.id,
        Some(&v2),
        None,
        CascadeOptions {
            force_update: true,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();
    assert!(forced.skipped_children.is_empty());
    let overwritten = db.get_issue(pinned.id).unwrap();
    assert_eq!(overwritten.version_id, Some(v2.id));
    assert!(!overwritten.version_pinned);
}

#[test]
fn automation_assignment_does_not_pin() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let version = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 6, 1)))
        .unwrap();
    let task = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t"))
        .unwrap();

    change_version_with_dates(
        &db,
        task.id,
        Some(&version),
        None,
        CascadeOptions::default(),
        &Actor::automation("issue-bot"),
        &config,
    )
    .unwrap();
    assert!(!db.get_issue(task.id).unwrap().version_pinned);
}

#[test]
fn update_parent_brackets_dates_but_never_version() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let v1 = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 6, 1)))
        .unwrap();
    let v2 = db
        .create_version(&NewVersion::new(project_id, "v2").with_effective_date(date(2026, 9, 1)))
        .unwrap();

    let feature = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Feature, "f"))
        .unwrap();
    let story = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "s").with_parent(feature.id),
        )
        .unwrap();
    // The feature keeps its own milestone.
    change_version_with_dates(
        &db,
        feature.id,
        Some(&v2),
        None,
        CascadeOptions {
            propagate_to_children: false,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();

    let outcome = change_version_with_dates(
        &db,
        story.id,
        Some(&v1),
        None,
        CascadeOptions {
            update_parent: true,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();

    let parent = outcome.parent.unwrap();
    assert_eq!(parent.id, feature.id);
    // Dates bracket the child's range; the version is untouched.
    assert_eq!(parent.due_date, Some(date(2026, 6, 1)));
    assert_eq!(parent.version_id, Some(v2.id));
}

#[test]
fn parent_update_skipped_outside_version_window() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let early = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 6, 1)))
        .unwrap();
    let late = db
        .create_version(&NewVersion::new(project_id, "v2").with_effective_date(date(2026, 9, 1)))
        .unwrap();

    let feature = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Feature, "f"))
        .unwrap();
    let story = db
        .insert_issue(
            &NewIssue::new(project_id, Tracker::UserStory, "s").with_parent(feature.id),
        )
        .unwrap();
    change_version_with_dates(
        &db,
        feature.id,
        Some(&early),
        None,
        CascadeOptions {
            propagate_to_children: false,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();

    // The child lands on a later milestone; bracketing would push the
    // feature past its own effective date, so it is skipped and reported.
    let outcome = change_version_with_dates(
        &db,
        story.id,
        Some(&late),
        None,
        CascadeOptions {
            update_parent: true,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();

    assert!(outcome.parent.is_none());
    assert_eq!(
        outcome.parent_skipped,
        Some(ParentSkipReason::OutsideVersionWindow)
    );
}

#[test]
fn siblings_are_reported_without_change() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let version = db
        .create_version(&NewVersion::new(project_id, "v1").with_effective_date(date(2026, 6, 1)))
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

    let outcome = change_version_with_dates(
        &db,
        story.id,
        Some(&version),
        None,
        CascadeOptions {
            update_parent: true,
            ..CascadeOptions::default()
        },
        &human(),
        &config,
    )
    .unwrap();

    assert_eq!(outcome.siblings, vec![sibling.id]);
    // The sibling's version was not touched by the child-driven cascade.
    assert_eq!(db.get_issue(sibling.id).unwrap().version_id, None);
}

#[test]
fn locked_version_warns_by_default_and_rejects_in_strict() {
    let (db, project_id) = fixture();
    let config = EngineConfig::default();
    let mut locked = NewVersion::new(project_id, "frozen").with_effective_date(date(2026, 6, 1));
    locked.status = VersionStatus::Locked;
    let locked = db.create_version(&locked).unwrap();
    let task = db
        .insert_issue(&NewIssue::new(project_id, Tracker::Task, "t"))
        .unwrap();

    let outcome = change_version_with_dates(
        &db,
        task.id,
        Some(&locked),
        None,
        CascadeOptions::default(),
        &human(),
        &config,
    )
    .unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.issue.version_id, Some(locked.id));

    let err = change_version_with_dates(
        &db,
        task.id,
        None,
        None,
        CascadeOptions::default(),
        &human(),
        &config,
    )
    .and_then(|_| {
        change_version_with_dates(
            &db,
            task.id,
            Some(&locked),
            None,
            CascadeOptions {
                strict: true,
                ..CascadeOptions::default()
            },
            &human(),
            &config,
        )
    })
    .unwrap_err();
    assert!(matches!(err, Error::VersionLocked { .. }));
}

#[test]
fn unassignable_version_reports_the_full_assignable_set() {
    let db = Database::open_in_memory().unwrap();
    let home = db.create_project("home", "Home", None).unwrap();
    let foreign = db.create_project("foreign", "Foreign", None).unwrap();
    let ours = db.create_version(&NewVersion::new(home.id, "ours")).unwrap();
    let theirs = db.create_version(&NewVersion::new(foreign.id, "theirs")).unwrap();
    let task = db
        .insert_issue(&NewIssue::new(home.id, Tracker::Task, "t"))
        .unwrap();

    let err = change_version_with_dates(
        &db,
        task.id,
        Some(&theirs),
        None,
        CascadeOptions::default(),
        &human(),
        &EngineConfig::default(),
    )
    .unwrap_err();
    match err {
        Error::VersionNotAssignable {
            version_id,
            assignable,
            ..
        } => {
            assert_eq!(version_id, theirs.id);
            assert_eq!(assignable.len(), 1);
            assert_eq!(assignable[0].id, ours.id);
        }
        other => panic!("expected VersionNotAssignable, got {other:?}"),
    }
}

#[test]
fn impact_counts_self_descendants_parent_and_siblings() {
    let (db, project_id) = fixture();
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

    let without_parent = calculate_impact(&db, story.id, false).unwrap();
    assert_eq!(without_parent.total, 2);
    assert_eq!(without_parent.descendant_ids, vec![task.id]);
    assert!(without_parent.parent_id.is_none());

    let with_parent = calculate_impact(&db, story.id, true).unwrap();
    assert_eq!(with_parent.total, 4);
    assert_eq!(with_parent.parent_id, Some(feature.id));
    assert_eq!(with_parent.sibling_ids, vec![sibling.id]);
}
