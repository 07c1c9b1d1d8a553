// Transport-agnostic RPC message shapes.
//
// Wire encoding is not fixed by this crate (cross-version wire compatibility
// with other Raft implementations is a non-goal); every message derives
// `Serialize`/`Deserialize` so an embedder can pick whatever framing it
// already uses.

use crate::types::{LogEntry, LogIndex, NodeId, Term};
use serde::{Deserialize, Serialize};

/// Outcome of a vote request, from the voter's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteResult {
    Granted,
    NotGranted,
    /// The candidate id in the request was unrecognized and no peer was
    /// allocated for it (allocation only happens on a grant path).
    NodeNotFound,
    /// Reserved for transport-level delivery failure; treated as a no-op by
    /// `recv_vote_response`, same as `NotGranted`.
    Err,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_idx: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: Term,
    pub vote: VoteResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_idx: LogIndex,
    pub prev_log_term: Term,
    pub leader_commit: LogIndex,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    /// The follower's highest accepted index.
    pub current_idx: LogIndex,
    /// The first index in the request's `entries`, or 0 if it was empty.
    pub first_idx: LogIndex,
}

/// Message shapes only — no handler in this crate wires these up. Snapshot
/// delivery to a far-behind follower is sketched at contract level; an
/// embedder implementing full log replication can build its
/// `InstallSnapshot` RPC handler directly on `Log::load_snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: Term,
    pub success: bool,
}

/// Envelope a transport actually moves. Kept as a single enum so an
/// embedder's dispatch loop can read one message type off the wire and hand
/// it straight to the matching `Server` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendEntriesRequest(AppendEntriesRequest),
    AppendEntriesResponse(AppendEntriesResponse),
}
