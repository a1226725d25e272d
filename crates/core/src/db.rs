// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed persistence for the grid engine.
//!
//! The [`Database`] struct provides all data access for projects, versions,
//! issues, relations, change events, and batch-operation history. The issue
//! row is the unit of mutual exclusion: [`Database::update_issue`] is a
//! single-statement compare-and-set on `lock_version`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

use crate::engine::{BatchHistoryEntry, HistoryFilter};
use crate::error::{Error, Result};
use crate::events::{ChangeEvent, Cursor, EventRecord};
use crate::issue::{Issue, NewIssue, Relation, RelationKind};
use crate::project::Project;
use crate::version::{NewVersion, Version, VersionSharing};

/// SQL schema for the grid engine database.
pub const SCHEMA: &str = r#"
-- Projects, minimal: ancestry drives version inheritance
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES projects(id)
);

-- Release milestones (grid columns)
CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    name TEXT NOT NULL,
    description TEXT,
    effective_date TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    sharing TEXT NOT NULL DEFAULT 'none'
);

-- Work items; lock_version is the optimistic-concurrency counter
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    tracker TEXT NOT NULL,
    subject TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'new',
    priority TEXT NOT NULL DEFAULT 'normal',
    assignee TEXT,
    parent_id INTEGER REFERENCES issues(id),
    version_id INTEGER REFERENCES versions(id),
    start_date TEXT,
    due_date TEXT,
    estimated_hours REAL,
    done_ratio INTEGER NOT NULL DEFAULT 0,
    version_pinned INTEGER NOT NULL DEFAULT 0,
    lock_version INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    deleted_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Relations survive soft deletion (audit trail)
CREATE TABLE IF NOT EXISTS relations (
    from_id INTEGER NOT NULL REFERENCES issues(id),
    to_id INTEGER NOT NULL REFERENCES issues(id),
    rel TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id, rel),
    CHECK (from_id != to_id)
);

-- Append-only change feed, ordered by (ts_ms, seq) per project
CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    ts_ms INTEGER NOT NULL,
    change_type TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id INTEGER NOT NULL,
    lock_version INTEGER,
    actor TEXT NOT NULL,
    payload TEXT NOT NULL
);

-- One row per batch operation (audit/query)
CREATE TABLE IF NOT EXISTS batch_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    operation TEXT NOT NULL,
    actor TEXT NOT NULL,
    affected_count INTEGER NOT NULL,
    success_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id);
CREATE INDEX IF NOT EXISTS idx_issues_parent ON issues(parent_id);
CREATE INDEX IF NOT EXISTS idx_issues_version ON issues(version_id);
CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
CREATE INDEX IF NOT EXISTS idx_versions_project ON versions(project_id);
CREATE INDEX IF NOT EXISTS idx_relations_to ON relations(to_id);
CREATE INDEX IF NOT EXISTS idx_events_project ON events(project_id, ts_ms, seq);
CREATE INDEX IF NOT EXISTS idx_batch_history_project ON batch_history(project_id, created_at);
"#;

/// Column list for issue SELECTs, kept in one place so readers stay in sync.
const ISSUE_COLUMNS: &str = "id, project_id, tracker, subject, description, status, priority, \
     assignee, parent_id, version_id, start_date, due_date, estimated_hours, \
     done_ratio, version_pinned, lock_version, deleted_at, deleted_reason, \
     created_at, updated_at";

/// Parse a string value from the database, returning a rusqlite error on
/// parse failure.
fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid value '{value}' in column '{column}'"
            ))),
        )
    })
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse an optional ISO date from the database.
fn parse_date_opt(
    value: Option<String>,
    column: &str,
) -> std::result::Result<Option<NaiveDate>, rusqlite::Error> {
    match value {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map(Some).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid date '{s}' in column '{column}'"
                ))),
            )
        }),
    }
}

/// Parse an optional RFC3339 timestamp from the database.
fn parse_timestamp_opt(
    value: Option<String>,
    column: &str,
) -> std::result::Result<Option<DateTime<Utc>>, rusqlite::Error> {
    match value {
        None => Ok(None),
        Some(s) => parse_timestamp(&s, column).map(Some),
    }
}

/// Map an issue row (selected with [`ISSUE_COLUMNS`]) to an [`Issue`].
fn issue_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<Issue, rusqlite::Error> {
    let tracker: String = row.get(2)?;
    let status: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let start_date: Option<String> = row.get(10)?;
    let due_date: Option<String> = row.get(11)?;
    let deleted_at: Option<String> = row.get(16)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(Issue {
        id: row.get(0)?,
        project_id: row.get(1)?,
        tracker: parse_db(&tracker, "tracker")?,
        subject: row.get(3)?,
        description: row.get(4)?,
        status: parse_db(&status, "status")?,
        priority: parse_db(&priority, "priority")?,
        assignee: row.get(7)?,
        parent_id: row.get(8)?,
        version_id: row.get(9)?,
        start_date: parse_date_opt(start_date, "start_date")?,
        due_date: parse_date_opt(due_date, "due_date")?,
        estimated_hours: row.get(12)?,
        done_ratio: row.get(13)?,
        version_pinned: row.get(14)?,
        lock_version: row.get(15)?,
        deleted_at: parse_timestamp_opt(deleted_at, "deleted_at")?,
        deleted_reason: row.get(17)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

/// Map a version row to a [`Version`].
fn version_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<Version, rusqlite::Error> {
    let effective_date: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let sharing: String = row.get(6)?;
    Ok(Version {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        effective_date: parse_date_opt(effective_date, "effective_date")?,
        status: parse_db(&status, "status")?,
        sharing: parse_db(&sharing, "sharing")?,
    })
}

/// Map an event row to a [`ChangeEvent`].
fn event_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ChangeEvent, rusqlite::Error> {
    let change_type: String = row.get(3)?;
    let resource_type: String = row.get(4)?;
    let payload: String = row.get(8)?;
    let ts_ms: i64 = row.get(2)?;
    let seq: i64 = row.get(0)?;
    let cursor = Cursor::new(ts_ms, seq);
    Ok(ChangeEvent {
        cursor,
        project_id: row.get(1)?,
        change_type: parse_db(&change_type, "change_type")?,
        resource_type: parse_db(&resource_type, "resource_type")?,
        resource_id: row.get(5)?,
        lock_version: row.get(6)?,
        actor: row.get(7)?,
        timestamp: cursor.timestamp(),
        payload: serde_json::from_str(&payload).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData("invalid event payload".to_string())),
            )
        })?,
    })
}

/// Run schema creation and all migrations on a database connection.
///
/// This is the single migration path for every crate in the workspace. It
/// applies the canonical schema and runs idempotent migrations to upgrade
/// older databases.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_add_version_pinned(conn)?;
    Ok(())
}

/// Migration: add the manual-pin column to databases created before it
/// existed.
fn migrate_add_version_pinned(conn: &Connection) -> Result<()> {
    let has_column: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('issues') WHERE name = 'version_pinned'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if !has_column {
        conn.execute(
            "ALTER TABLE issues ADD COLUMN version_pinned INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

/// SQLite database connection with grid engine operations.
pub struct Database {
    /// The underlying SQLite connection.
    pub conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Foreign keys on, WAL for concurrent readers
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let db = Database { conn };
        run_migrations(&db.conn)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        run_migrations(&db.conn)?;
        Ok(db)
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Create a project.
    pub fn create_project(
        &self,
        identifier: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Project> {
        self.conn.execute(
            "INSERT INTO projects (identifier, name, parent_id) VALUES (?1, ?2, ?3)",
            params![identifier, name, parent_id],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Project {
            id,
            identifier: identifier.to_string(),
            name: name.to_string(),
            parent_id,
        })
    }

    /// Get a project by ID.
    pub fn get_project(&self, id: i64) -> Result<Project> {
        let project = self
            .conn
            .query_row(
                "SELECT id, identifier, name, parent_id FROM projects WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        identifier: row.get(1)?,
                        name: row.get(2)?,
                        parent_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        project.ok_or(Error::ProjectNotFound(id))
    }

    /// IDs of the project's ancestors, nearest first. Walks parent pointers
    /// with a visited set so a corrupted cycle cannot loop forever.
    pub fn project_ancestor_ids(&self, id: i64) -> Result<Vec<i64>> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);
        let mut current = self.get_project(id)?.parent_id;
        while let Some(pid) = current {
            if !visited.insert(pid) {
                break;
            }
            ancestors.push(pid);
            current = self.get_project(pid)?.parent_id;
        }
        Ok(ancestors)
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Create a version.
    pub fn create_version(&self, new: &NewVersion) -> Result<Version> {
        self.conn.execute(
            "INSERT INTO versions (project_id, name, description, effective_date, status, sharing)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.project_id,
                new.name,
                new.description,
                new.effective_date.map(|d| d.to_string()),
                new.status.as_str(),
                new.sharing.as_str(),
            ],
        )?;
        self.get_version(self.conn.last_insert_rowid())
    }

    /// Get a version by ID.
    pub fn get_version(&self, id: i64) -> Result<Version> {
        let version = self
            .conn
            .query_row(
                "SELECT id, project_id, name, description, effective_date, status, sharing
                 FROM versions WHERE id = ?1",
                params![id],
                version_from_row,
            )
            .optional()?;
        version.ok_or(Error::VersionNotFound(id))
    }

    /// All versions owned by a project, ordered by effective date.
    pub fn project_versions(&self, project_id: i64) -> Result<Vec<Version>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, description, effective_date, status, sharing
             FROM versions WHERE project_id = ?1
             ORDER BY effective_date IS NULL, effective_date, id",
        )?;
        let versions = stmt
            .query_map(params![project_id], version_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// The set of versions an issue in `project_id` may legally adopt: the
    /// project's own versions, versions shared down from ancestor projects,
    /// and system-shared versions.
    pub fn assignable_versions(&self, project_id: i64) -> Result<Vec<Version>> {
        let ancestors = self.project_ancestor_ids(project_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, description, effective_date, status, sharing
             FROM versions
             ORDER BY effective_date IS NULL, effective_date, id",
        )?;
        let all = stmt
            .query_map([], version_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(all
            .into_iter()
            .filter(|v| {
                v.project_id == project_id
                    || v.sharing == VersionSharing::System
                    || (v.sharing == VersionSharing::Descendants
                        && ancestors.contains(&v.project_id))
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Issues
    // ------------------------------------------------------------------

    /// Insert a new issue row. Validation belongs to the engine; this is raw
    /// persistence.
    pub fn insert_issue(&self, new: &NewIssue) -> Result<Issue> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO issues (project_id, tracker, subject, description, status, priority,
             assignee, parent_id, version_id, start_date, due_date, estimated_hours,
             done_ratio, version_pinned, lock_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, 0, 0, ?13, ?13)",
            params![
                new.project_id,
                new.tracker.as_str(),
                new.subject,
                new.description,
                new.status.as_str(),
                new.priority.as_str(),
                new.assignee,
                new.parent_id,
                new.version_id,
                new.start_date.map(|d| d.to_string()),
                new.due_date.map(|d| d.to_string()),
                new.estimated_hours,
                now,
            ],
        )?;
        self.get_issue(self.conn.last_insert_rowid())
    }

    /// Get an issue by ID. Soft-deleted issues are still readable.
    pub fn get_issue(&self, id: i64) -> Result<Issue> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
        let issue = self
            .conn
            .query_row(&sql, params![id], issue_from_row)
            .optional()?;
        issue.ok_or(Error::IssueNotFound(id))
    }

    /// Check if an issue exists.
    pub fn issue_exists(&self, id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Live (non-deleted) children of an issue.
    pub fn children_of(&self, id: i64) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE parent_id = ?1 AND deleted_at IS NULL ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let issues = stmt
            .query_map(params![id], issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    /// Ancestor issue IDs, nearest first, with a visited set against
    /// caller-supplied parent-pointer cycles.
    pub fn issue_ancestor_ids(&self, id: i64) -> Result<Vec<i64>> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);
        let mut current = self.get_issue(id)?.parent_id;
        while let Some(pid) = current {
            if !visited.insert(pid) {
                break;
            }
            ancestors.push(pid);
            current = self.get_issue(pid)?.parent_id;
        }
        Ok(ancestors)
    }

    /// All issues in a project, optionally including soft-deleted rows.
    pub fn list_issues(&self, project_id: i64, include_deleted: bool) -> Result<Vec<Issue>> {
        let sql = if include_deleted {
            format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE project_id = ?1 ORDER BY id")
        } else {
            format!(
                "SELECT {ISSUE_COLUMNS} FROM issues
                 WHERE project_id = ?1 AND deleted_at IS NULL ORDER BY id"
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let issues = stmt
            .query_map(params![project_id], issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    /// Write every mutable field of `issue` in one statement, guarded by
    /// `expected_lock`. The row's `lock_version` becomes `expected_lock + 1`
    /// atomically with the rest of the update.
    ///
    /// Zero affected rows means another writer won the race (or the issue is
    /// gone); the caller gets `ConcurrencyConflict` with the authoritative
    /// current value.
    pub fn update_issue(&self, issue: &Issue, expected_lock: i64) -> Result<Issue> {
        let now = Utc::now().to_rfc3339();
        let affected = self.conn.execute(
            "UPDATE issues SET
                 subject = ?1, description = ?2, status = ?3, priority = ?4,
                 assignee = ?5, parent_id = ?6, version_id = ?7, start_date = ?8,
                 due_date = ?9, estimated_hours = ?10, done_ratio = ?11,
                 version_pinned = ?12, deleted_at = ?13, deleted_reason = ?14,
                 updated_at = ?15, lock_version = ?16 + 1
             WHERE id = ?17 AND lock_version = ?16",
            params![
                issue.subject,
                issue.description,
                issue.status.as_str(),
                issue.priority.as_str(),
                issue.assignee,
                issue.parent_id,
                issue.version_id,
                issue.start_date.map(|d| d.to_string()),
                issue.due_date.map(|d| d.to_string()),
                issue.estimated_hours,
                issue.done_ratio,
                issue.version_pinned,
                issue.deleted_at.map(|t| t.to_rfc3339()),
                issue.deleted_reason,
                now,
                expected_lock,
                issue.id,
            ],
        )?;

        if affected == 0 {
            let current = self.get_issue(issue.id)?;
            return Err(Error::ConcurrencyConflict {
                resource_id: issue.id,
                current_version: current.lock_version,
                attempted_version: expected_lock,
            });
        }
        self.get_issue(issue.id)
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Add a relation between two issues.
    pub fn add_relation(&self, from_id: i64, to_id: i64, rel: RelationKind) -> Result<()> {
        if from_id == to_id {
            return Err(Error::ValidationFailed(
                "an issue cannot relate to itself".to_string(),
            ));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO relations (from_id, to_id, rel, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![from_id, to_id, rel.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// All relations where the issue is either endpoint.
    pub fn relations_involving(&self, id: i64) -> Result<Vec<Relation>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_id, to_id, rel, created_at FROM relations
             WHERE from_id = ?1 OR to_id = ?1 ORDER BY created_at",
        )?;
        let relations = stmt
            .query_map(params![id], |row| {
                let rel: String = row.get(2)?;
                let created: String = row.get(3)?;
                Ok(Relation {
                    from_id: row.get(0)?,
                    to_id: row.get(1)?,
                    rel: parse_db(&rel, "rel")?,
                    created_at: parse_timestamp(&created, "created_at")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    // ------------------------------------------------------------------
    // Change events
    // ------------------------------------------------------------------

    /// Append a change event with a server-assigned cursor.
    pub fn append_event(&self, project_id: i64, record: &EventRecord) -> Result<ChangeEvent> {
        let ts_ms = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO events (project_id, ts_ms, change_type, resource_type,
             resource_id, lock_version, actor, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project_id,
                ts_ms,
                record.change_type.as_str(),
                record.resource_type.as_str(),
                record.resource_id,
                record.lock_version,
                record.actor,
                record.payload.to_string(),
            ],
        )?;
        let seq = self.conn.last_insert_rowid();
        let cursor = Cursor::new(ts_ms, seq);
        Ok(ChangeEvent {
            cursor,
            project_id,
            change_type: record.change_type,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            lock_version: record.lock_version,
            actor: record.actor.clone(),
            timestamp: cursor.timestamp(),
            payload: record.payload.clone(),
        })
    }

    /// Events strictly after `since`, oldest first. The cursor is exclusive
    /// on `since` and inclusive going forward, so no event is delivered zero
    /// or two times to a well-behaved poller.
    pub fn events_since(
        &self,
        project_id: i64,
        since: Cursor,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, project_id, ts_ms, change_type, resource_type,
                    resource_id, lock_version, actor, payload
             FROM events
             WHERE project_id = ?1 AND (ts_ms > ?2 OR (ts_ms = ?2 AND seq > ?3))
             ORDER BY ts_ms, seq LIMIT ?4",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let events = stmt
            .query_map(params![project_id, since.ts_ms, since.seq, limit], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Delete events older than `cutoff_ms`, returning how many were removed.
    pub fn prune_events(&self, cutoff_ms: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM events WHERE ts_ms < ?1", params![cutoff_ms])?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Batch operation history
    // ------------------------------------------------------------------

    /// Record a batch-operation audit row, returning its ID.
    pub fn record_batch_history(&self, entry: &BatchHistoryEntry) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO batch_history (project_id, operation, actor, affected_count,
             success_count, error_count, elapsed_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.project_id,
                entry.operation,
                entry.actor,
                entry.affected_count,
                entry.success_count,
                entry.error_count,
                entry.elapsed_ms,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Query batch history for a project, newest first, with optional
    /// operation/actor filters.
    pub fn batch_history(
        &self,
        project_id: i64,
        filter: &HistoryFilter,
    ) -> Result<Vec<BatchHistoryEntry>> {
        let mut sql = String::from(
            "SELECT id, project_id, operation, actor, affected_count, success_count,
             error_count, elapsed_ms, created_at
             FROM batch_history WHERE project_id = ?",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_id)];

        if let Some(op) = &filter.operation {
            sql.push_str(" AND operation = ?");
            params_vec.push(Box::new(op.clone()));
        }
        if let Some(actor) = &filter.actor {
            sql.push_str(" AND actor = ?");
            params_vec.push(Box::new(actor.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        params_vec.push(Box::new(i64::try_from(filter.limit).unwrap_or(i64::MAX)));
        params_vec.push(Box::new(i64::try_from(filter.offset).unwrap_or(0)));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let entries = stmt
            .query_map(params_refs.as_slice(), |row| {
                let created: String = row.get(8)?;
                Ok(BatchHistoryEntry {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    operation: row.get(2)?,
                    actor: row.get(3)?,
                    affected_count: row.get(4)?,
                    success_count: row.get(5)?,
                    error_count: row.get(6)?,
                    elapsed_ms: row.get(7)?,
                    created_at: parse_timestamp(&created, "created_at")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl crate::events::EventStore for Database {
    fn append(&self, project_id: i64, record: EventRecord) -> Result<ChangeEvent> {
        self.append_event(project_id, &record)
    }

    fn query_since(&self, project_id: i64, since: Cursor, limit: usize) -> Result<Vec<ChangeEvent>> {
        self.events_since(project_id, since, limit)
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.prune_events(cutoff.timestamp_millis())
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
