// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Change distribution to push and pull observers.
//!
//! Push observers subscribe to a per-project channel and receive events as
//! they are published (at-least-once; dedupe by `(resource_id, cursor)` is
//! the observer's job). Pull observers poll with a server-assigned cursor.
//! Both read the same [`EventStore`], so they cannot diverge.
//!
//! Sessions are heartbeat-based: a session without a heartbeat inside the
//! TTL stops receiving events and is garbage-collected; the observer must
//! resubscribe.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::events::{ChangeEvent, Cursor, EventRecord, EventStore};
use crate::issue::Actor;

/// Default capacity for a poll page.
pub const DEFAULT_POLL_LIMIT: usize = 100;

/// Observer-facing session state classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Heartbeat within the last two minutes.
    Active,
    /// Heartbeat within the last five minutes.
    Idle,
    /// No recent heartbeat; about to be collected.
    Inactive,
}

/// Summary of one push session, for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub project_id: i64,
    pub actor: String,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub state: SessionState,
}

/// A page of events returned to a pull observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPage {
    pub events: Vec<ChangeEvent>,
    /// Server-assigned; pass back as `since` on the next poll.
    pub next_cursor: Cursor,
    pub has_more: bool,
}

struct Subscription {
    project_id: i64,
    actor: String,
    sender: Sender<ChangeEvent>,
    connected_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
}

/// Fan-out hub for change events.
pub struct ChangeDistributor {
    sessions: Mutex<HashMap<String, Subscription>>,
    session_ttl: Duration,
    counter: AtomicU64,
}

impl ChangeDistributor {
    /// Creates a distributor whose sessions expire after `session_ttl`
    /// without a heartbeat.
    pub fn new(session_ttl: Duration) -> Self {
        ChangeDistributor {
            sessions: Mutex::new(HashMap::new()),
            session_ttl,
            counter: AtomicU64::new(0),
        }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Subscription>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a push observer on a project channel. Returns the session ID
    /// and the receiving end of the event stream.
    pub fn subscribe(&self, project_id: i64, actor: &Actor) -> (String, Receiver<ChangeEvent>) {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("{}-{}-{:08x}", actor.id, project_id, n);
        let (sender, receiver) = mpsc::channel();
        let now = Utc::now();
        self.lock_sessions().insert(
            session_id.clone(),
            Subscription {
                project_id,
                actor: actor.name.clone(),
                sender,
                connected_at: now,
                last_heartbeat: now,
            },
        );
        tracing::debug!(%session_id, project_id, "push session subscribed");
        (session_id, receiver)
    }

    /// Refresh a session's heartbeat. Returns the new expiry time.
    pub fn heartbeat(&self, session_id: &str) -> Result<DateTime<Utc>> {
        let mut sessions = self.lock_sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.last_heartbeat = Utc::now();
        Ok(session.last_heartbeat + self.session_ttl)
    }

    /// Remove a session. Returns true if it existed.
    pub fn unsubscribe(&self, session_id: &str) -> bool {
        self.lock_sessions().remove(session_id).is_some()
    }

    /// True if the session is still registered.
    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.lock_sessions().contains_key(session_id)
    }

    /// Append an event to the store and fan it out to the project's push
    /// sessions. Sessions whose receiver is gone are dropped.
    pub fn publish<S: EventStore>(
        &self,
        store: &S,
        project_id: i64,
        record: EventRecord,
    ) -> Result<ChangeEvent> {
        let event = store.append(project_id, record)?;

        let mut sessions = self.lock_sessions();
        let mut dead = Vec::new();
        for (id, session) in sessions.iter() {
            if session.project_id != project_id {
                continue;
            }
            if session.sender.send(event.clone()).is_err() {
                dead.push(id.clone());
            }
        }
        for id in dead {
            sessions.remove(&id);
            tracing::debug!(session_id = %id, "dropped disconnected push session");
        }

        Ok(event)
    }

    /// Serve a pull observer. `since` is exclusive; the returned cursor is
    /// server-assigned, so clock drift on the observer cannot skip events.
    pub fn poll<S: EventStore>(
        &self,
        store: &S,
        project_id: i64,
        since: Cursor,
        limit: usize,
    ) -> Result<PollPage> {
        let limit = if limit == 0 { DEFAULT_POLL_LIMIT } else { limit };
        let mut events = store.query_since(project_id, since, limit + 1)?;
        let has_more = events.len() > limit;
        events.truncate(limit);
        let next_cursor = events.last().map(|e| e.cursor).unwrap_or(since);
        Ok(PollPage {
            events,
            next_cursor,
            has_more,
        })
    }

    /// Drop sessions whose last heartbeat is older than the TTL. Returns how
    /// many were collected.
    pub fn prune_expired(&self) -> usize {
        let deadline = Utc::now() - self.session_ttl;
        let mut sessions = self.lock_sessions();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.last_heartbeat < deadline)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "expired push session collected");
        }
        expired.len()
    }

    /// Session listing for a project, for monitoring.
    pub fn active_sessions(&self, project_id: i64) -> Vec<SessionInfo> {
        let now = Utc::now();
        let mut infos: Vec<SessionInfo> = self
            .lock_sessions()
            .iter()
            .filter(|(_, s)| s.project_id == project_id)
            .map(|(id, s)| {
                let age = now - s.last_heartbeat;
                let state = if age <= Duration::minutes(2) {
                    SessionState::Active
                } else if age <= Duration::minutes(5) {
                    SessionState::Idle
                } else {
                    SessionState::Inactive
                };
                SessionInfo {
                    session_id: id.clone(),
                    project_id: s.project_id,
                    actor: s.actor.clone(),
                    connected_at: s.connected_at,
                    last_heartbeat: s.last_heartbeat,
                    state,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }
}

#[cfg(test)]
#[path = "distributor_tests.rs"]
mod tests;
