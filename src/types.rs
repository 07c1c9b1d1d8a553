// Core identifiers and the log entry shape shared by every other module.
//
// Kept deliberately thin: these are the vocabulary of the wire messages
// (rpc.rs), the log (log.rs) and the node table (node.rs), not a home for
// behavior.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An election term. Monotonically nondecreasing for the lifetime of a node.
pub type Term = u64;

/// A 1-based position in the replicated log. `0` means "none".
pub type LogIndex = u64;

/// Stable identifier for a node, unique within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// What an entry carries. `Regular` entries are Raft-internal (currently only
/// ever empty, i.e. heartbeats replicate no entry); `User` entries carry an
/// opaque payload handed to the application state machine on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Regular,
    User,
}

/// An entry in the replicated log.
///
/// Once appended at index `i` with term `t`, the pair `(i, t)` uniquely
/// identifies this entry across the cluster. Entries are never mutated in
/// place — only appended, truncated from the tail, or polled from the head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub term: Term,
    pub entry_id: u64,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn user(term: Term, entry_id: u64, payload: Vec<u8>) -> Self {
        Self {
            kind: EntryKind::User,
            term,
            entry_id,
            payload,
        }
    }

    pub fn regular(term: Term, entry_id: u64) -> Self {
        Self {
            kind: EntryKind::Regular,
            term,
            entry_id,
            payload: Vec::new(),
        }
    }
}
