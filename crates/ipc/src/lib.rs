// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! grid-ipc: wire protocol between the grid daemon and its clients.
//!
//! Requests and responses are JSON with length-prefixed framing (4-byte
//! big-endian length, then the message body). A `Subscribe` request switches
//! the connection into push mode: the daemon answers `Subscribed` and then
//! streams [`PushFrame`]s on the same connection until the client drops it
//! or the session expires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grid_core::dates::{ImpactSummary, VersionChangeOutcome};
use grid_core::distributor::{PollPage, SessionInfo};
use grid_core::engine::{
    BatchHistoryEntry, BatchItem, BatchOutcome, BatchUpdateFields, HistoryFilter, IssueUpdate,
    MoveOutcome, MoveRequest, PriorityAdjustment, SoftDeleteOutcome, StatusTransitionOutcome,
    VersionAssignOutcome,
};
use grid_core::events::{ChangeEvent, Cursor};
use grid_core::issue::{Actor, Issue, NewIssue, Status};
use grid_core::propagation::{AssignVersionRequest, ConsistencyReport};
use grid_core::version::Version;

/// Request sent from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    /// Ping to check if the daemon is alive.
    Ping,
    /// Get daemon status.
    Status,
    /// Graceful shutdown.
    Shutdown,
    /// Version handshake request.
    Hello { version: String },
    /// Read operation.
    Query(QueryOp),
    /// Write operation, dispatched to the mutation engine.
    Mutate(MutateOp),
    /// Enter push mode on this connection for a project channel.
    Subscribe { project_id: i64, actor: Actor },
    /// Keep a push session alive (sent on a separate connection).
    Heartbeat { session_id: String },
    /// Drop a push session.
    Unsubscribe { session_id: String },
    /// Pull events after a cursor. Omitted cursor means from the origin.
    Poll {
        project_id: i64,
        since: Option<Cursor>,
        limit: Option<usize>,
    },
}

/// Read operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op")]
pub enum QueryOp {
    /// Get a single issue by ID.
    GetIssue { id: i64 },
    /// List a project's issues.
    ListIssues {
        project_id: i64,
        include_deleted: bool,
    },
    /// Get a single version by ID.
    GetVersion { id: i64 },
    /// List a project's own versions.
    ListVersions { project_id: i64 },
    /// The versions issues of this project may adopt (own + inherited).
    AssignableVersions { project_id: i64 },
    /// Pre-flight impact of a version change.
    CalculateImpact { issue_id: i64, update_parent: bool },
    /// Parent/child version divergence report.
    CheckConsistency { project_id: i64 },
    /// Batch-operation audit query.
    OperationHistory {
        project_id: i64,
        filter: HistoryFilter,
    },
    /// Push-session listing for a project.
    ActiveSessions { project_id: i64 },
}

/// Write operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op")]
pub enum MutateOp {
    /// Create a new issue.
    CreateIssue { new: NewIssue, actor: Actor },
    /// Edit fields of a single issue.
    UpdateIssue {
        id: i64,
        update: IssueUpdate,
        actor: Actor,
    },
    /// Drag-and-drop move to a grid cell.
    MoveIssue {
        id: i64,
        request: MoveRequest,
        actor: Actor,
    },
    /// Assign (or clear) a version with cascade.
    AssignVersion {
        issue_id: i64,
        version_id: Option<i64>,
        request: AssignVersionRequest,
        actor: Actor,
    },
    /// Bulk field update.
    BatchUpdate {
        project_id: i64,
        items: Vec<BatchItem>,
        fields: BatchUpdateFields,
        actor: Actor,
    },
    /// Bulk version assignment.
    BatchAssignVersion {
        project_id: i64,
        items: Vec<BatchItem>,
        version_id: Option<i64>,
        propagate_to_children: bool,
        force_update: bool,
        actor: Actor,
    },
    /// Bulk status transition.
    BatchTransitionStatus {
        project_id: i64,
        items: Vec<BatchItem>,
        target: Status,
        workflow_validation: bool,
        actor: Actor,
    },
    /// Bulk priority adjustment.
    BatchAdjustPriorities {
        project_id: i64,
        adjustments: Vec<PriorityAdjustment>,
        actor: Actor,
    },
    /// Logical deletion.
    SoftDelete {
        project_id: i64,
        items: Vec<BatchItem>,
        reason: Option<String>,
        actor: Actor,
    },
}

/// Response sent from the daemon to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    /// Pong response.
    Pong,
    /// Status response.
    Status(DaemonStatus),
    /// Shutdown acknowledged.
    ShuttingDown,
    /// Version handshake response.
    Hello { version: String },
    /// Error with a stable code; internal errors carry a correlation id.
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
    /// Single issue.
    Issue(Issue),
    /// List of issues.
    Issues { issues: Vec<Issue> },
    /// Single version.
    Version(Version),
    /// List of versions.
    Versions { versions: Vec<Version> },
    /// Result of a move.
    Moved(MoveOutcome),
    /// Result of a version assignment with cascade.
    VersionChanged(Box<VersionChangeOutcome>),
    /// Result of a bulk field update or priority adjustment.
    Batch(BatchOutcome),
    /// Result of a bulk version assignment.
    VersionAssignBatch(VersionAssignOutcome),
    /// Result of a bulk status transition.
    StatusTransition(StatusTransitionOutcome),
    /// Result of a soft delete.
    SoftDeleted(SoftDeleteOutcome),
    /// Impact preview.
    Impact(ImpactSummary),
    /// Consistency report.
    Consistency(ConsistencyReport),
    /// Batch-history page.
    History { entries: Vec<BatchHistoryEntry> },
    /// Push-session listing.
    Sessions { sessions: Vec<SessionInfo> },
    /// Poll page.
    Poll(PollPage),
    /// Push mode engaged; frames follow on this connection.
    Subscribed { session_id: String },
    /// Heartbeat accepted; session valid until the given time.
    HeartbeatAck { valid_until: DateTime<Utc> },
    /// Unsubscribe processed; whether the session existed.
    Unsubscribed { removed: bool },
}

/// Frame streamed to a push subscriber after `Subscribed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PushFrame {
    /// One change event. Schema matches a `Poll` response element; dedupe by
    /// `(resource_id, cursor)`.
    Event(ChangeEvent),
    /// The session expired (missed heartbeats); resubscribe to continue.
    Expired,
}

/// Daemon status information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonStatus {
    /// Current daemon PID.
    pub pid: u32,
    /// Uptime in seconds.
    pub uptime_secs: u64,
}

impl DaemonStatus {
    /// Create a new status with the given parameters.
    pub fn new(pid: u32, uptime_secs: u64) -> Self {
        Self { pid, uptime_secs }
    }
}

/// IPC message framing.
///
/// Messages are framed as:
/// - 4 bytes: message length (big-endian u32)
/// - N bytes: JSON-encoded message
pub mod framing {
    use std::io::{Read, Write};

    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use super::{DaemonRequest, DaemonResponse, PushFrame};

    /// Maximum message size (1MB) to prevent malformed frames from causing
    /// unbounded allocation.
    const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Read one framed message from the given reader.
    pub fn read_message<T: DeserializeOwned, R: Read>(reader: &mut R) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::other(format!(
                "message too large: {} bytes (max {})",
                len, MAX_MESSAGE_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;

        serde_json::from_slice(&buf)
            .map_err(|e| std::io::Error::other(format!("deserialize error: {}", e)))
    }

    /// Write one framed message to the given writer.
    pub fn write_message<T: Serialize, W: Write>(writer: &mut W, message: &T) -> std::io::Result<()> {
        let json = serde_json::to_vec(message)
            .map_err(|e| std::io::Error::other(format!("serialize error: {}", e)))?;
        let len =
            u32::try_from(json.len()).map_err(|_| std::io::Error::other("message too large"))?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&json)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a request (daemon side).
    pub fn read_request<R: Read>(reader: &mut R) -> std::io::Result<DaemonRequest> {
        read_message(reader)
    }

    /// Write a response (daemon side).
    pub fn write_response<W: Write>(
        writer: &mut W,
        response: &DaemonResponse,
    ) -> std::io::Result<()> {
        write_message(writer, response)
    }

    /// Read a response (client side).
    pub fn read_response<R: Read>(reader: &mut R) -> std::io::Result<DaemonResponse> {
        read_message(reader)
    }

    /// Write a request (client side).
    pub fn write_request<W: Write>(writer: &mut W, request: &DaemonRequest) -> std::io::Result<()> {
        write_message(writer, request)
    }

    /// Write a push frame to a subscriber (daemon side).
    pub fn write_frame<W: Write>(writer: &mut W, frame: &PushFrame) -> std::io::Result<()> {
        write_message(writer, frame)
    }

    /// Read a push frame (client side).
    pub fn read_frame<R: Read>(reader: &mut R) -> std::io::Result<PushFrame> {
        read_message(reader)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
