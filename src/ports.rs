// External collaborators, as narrow traits.
//
// `Server<S, T, A>` is generic over these rather than boxing them as trait
// objects: a generic parameter monomorphizes to a direct call, with no
// v-table indirection on the hot path, matching the zero-cost defaults this
// codebase reaches for elsewhere (see `Log`'s direct struct fields rather
// than a boxed storage backend). No method here ever blocks or suspends;
// an embedder that needs to await something does so around the call, never
// inside it.

use crate::types::{LogEntry, LogIndex, NodeId, Term};
use crate::rpc::Message;

/// The durable store. Every method is expected to complete synchronously
/// from the Server's point of view: a `Storage` implementation that defers
/// to a background thread must not return `Ok` until the write is actually
/// durable, because the Server relies on that to decide whether a reply
/// depending on the write may be sent.
pub trait Storage {
    /// Must be durable before any vote reply referencing `term` is produced.
    fn persist_term(&mut self, term: Term) -> Result<(), String>;

    /// Must be durable before any vote reply referencing `voted_for` is
    /// produced. `None` persists "no vote" (e.g. after adopting a new term).
    fn persist_vote(&mut self, voted_for: Option<NodeId>) -> Result<(), String>;

    /// Called before `Log::append`; failure aborts the append and the
    /// in-memory log is left untouched.
    fn persist_entry(&mut self, entry: &LogEntry, index: LogIndex) -> Result<(), String>;

    /// Called before `Log::pop_front`, once per polled entry.
    fn persist_head_poll(&mut self, index: LogIndex) -> Result<(), String>;

    /// Called before `Log::pop_back`, once per truncated entry, youngest
    /// first. Failure stops the truncate loop with entries already removed
    /// staying removed.
    fn persist_tail_truncate(&mut self, index: LogIndex) -> Result<(), String>;
}

/// The transport. `send` is fire-and-forget from the Server's perspective —
/// the transport may drop, duplicate, reorder or delay a message, and the
/// core tolerates all three for vote and heartbeat traffic. No delivery
/// acknowledgement is required.
pub trait Transport {
    fn send(&mut self, peer: NodeId, message: Message);
}

/// The application state machine. `apply` is invoked once per committed
/// entry, in index order, as `last_applied` catches up to `commit_index`.
pub trait Apply {
    fn apply(&mut self, index: LogIndex, entry: &LogEntry);
}
