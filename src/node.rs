// The node table: an arena of Peer records keyed by NodeId.
//
// The table is the sole owner of each `Peer` (a plain HashMap), and
// `leader`/`voted_for` on the Server are `Option<NodeId>` lookups into it,
// never long-lived references.

use crate::types::{LogIndex, NodeId};
use std::collections::HashMap;

/// One peer's bookkeeping, as seen by a Server that is not necessarily that
/// peer's leader.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,

    /// Next log index the leader will send to this peer.
    pub next_index: LogIndex,

    /// Highest log index known to be replicated on this peer.
    pub match_index: LogIndex,

    /// Set when this peer granted us its vote in the current term's
    /// election; cleared on every new election round.
    pub voted_for_me: bool,

    /// Whether this peer's vote counts toward majority and whose log it
    /// replicates. A non-voting peer still receives replication.
    pub voting: bool,

    /// Whether this peer is currently reachable/participating. An inactive
    /// peer is skipped by majority counts and heartbeats.
    pub active: bool,

    /// Set once a non-voting peer's log has caught up enough to be promoted
    /// to voting. Bookkeeping only: promotion itself is a membership-change
    /// operation beyond this crate's scope.
    pub sufficient_logs: bool,

    /// Joint-consensus bookkeeping, carried as data for a membership-change
    /// mechanism this crate does not itself implement. No code here reads
    /// or sets these beyond construction and `node_add`/`node_remove`.
    pub voting_committed: bool,
    pub addition_committed: bool,
}

impl Peer {
    /// A freshly added, non-voting peer with cursors reset for a leader at
    /// `leader_current_index`.
    pub fn new(id: NodeId, voting: bool, leader_current_index: LogIndex) -> Self {
        Self {
            id,
            next_index: leader_current_index + 1,
            match_index: 0,
            voted_for_me: false,
            voting,
            active: true,
            sufficient_logs: false,
            voting_committed: voting,
            addition_committed: true,
        }
    }
}

/// The peer table. Owns every `Peer` this Server knows about, including
/// `this_node`'s own entry (added at construction, always voting).
#[derive(Debug, Default)]
pub struct NodeTable {
    peers: HashMap<NodeId, Peer>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Inserts a new peer. Returns `false` (no allocation performed, no
    /// state changed) if `id` is already present — the caller maps that to
    /// `RaftError::ENoMem` only when insertion is expected to be fresh;
    /// callers that tolerate re-adding an existing peer treat `false` as a
    /// no-op.
    pub fn insert(&mut self, peer: Peer) -> bool {
        if self.peers.contains_key(&peer.id) {
            return false;
        }
        self.peers.insert(peer.id, peer);
        true
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }

    /// Clears `voted_for_me` on every peer. Called when a node becomes a
    /// candidate for a new election round.
    pub fn clear_votes(&mut self) {
        for peer in self.peers.values_mut() {
            peer.voted_for_me = false;
        }
    }

    /// Count of peers that are both `voting` and `active`. Majority is
    /// `(voting_active() / 2) + 1`.
    pub fn voting_active(&self) -> usize {
        self.peers.values().filter(|p| p.voting && p.active).count()
    }
}
