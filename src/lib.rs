// raft-core: the leader-election half of Raft, as an embeddable library.
//
// This crate owns the core consensus state machine: the role state machine,
// the term/vote discipline, the replicated log, the node table, and the
// vote/append-entries handlers and periodic tick that drive them. Wire
// transport, durable storage, the application state machine and the clock
// are external collaborators reached only through the traits in `ports`.

pub mod config;
pub mod error;
pub mod log;
pub mod node;
pub mod ports;
pub mod role;
pub mod rpc;
pub mod server;
pub mod types;

#[cfg(feature = "runtime")]
pub mod runtime;

pub use config::RaftConfig;
pub use error::{RaftError, Result};
pub use log::Log;
pub use node::{NodeTable, Peer};
pub use ports::{Apply, Storage, Transport};
pub use role::{Event, Role};
pub use rpc::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    Message, VoteRequest, VoteResponse, VoteResult,
};
pub use server::Server;
pub use types::{EntryKind, LogEntry, LogIndex, NodeId, Term};
