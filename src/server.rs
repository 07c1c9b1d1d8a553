// The orchestrator: one node's view of the cluster.
//
// `Server` owns the log, the node table, the role FSM, the current term, the
// vote record, the leader pointer and the timing state, and exposes the
// inbound RPC handlers, the outbound-send contract and the periodic tick.
// It is generic over its three ports (`Storage`, `Transport`, `Apply`)
// rather than boxing them, per the note in ports.rs — a monomorphized call
// is the zero-cost default, and nothing here ever blocks or suspends.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RaftConfig;
use crate::error::{RaftError, Result};
use crate::log::Log;
use crate::node::{NodeTable, Peer};
use crate::ports::{Apply, Storage, Transport};
use crate::role::{Event, Role, RoleFsm};
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, Message, VoteRequest, VoteResponse, VoteResult,
};
use crate::types::{LogEntry, LogIndex, NodeId, Term};

/// Upper bound on the number of peers (including auto-added, unrecognized
/// candidates) a single Server will track, rather than growing the table
/// unbounded; exceeding it is what produces `RaftError::ENoMem`.
const MAX_PEERS: usize = 512;

pub struct Server<S: Storage, T: Transport, A: Apply> {
    this_node: NodeId,
    current_term: Term,
    voted_for: Option<NodeId>,
    leader: Option<NodeId>,
    role: RoleFsm,
    log: Log,
    nodes: NodeTable,
    commit_index: LogIndex,
    last_applied: LogIndex,

    elapsed_timeout: Duration,
    election_timeout_rand: Duration,
    config: RaftConfig,
    rng: StdRng,

    next_entry_id: u64,

    storage: S,
    transport: T,
    apply_machine: A,
}

impl<S: Storage, T: Transport, A: Apply> Server<S, T, A> {
    /// A fresh Server: role `follower`, term `0`, empty log, no vote, no
    /// leader, with only `this_node` in its view of the cluster (added as a
    /// voting peer is *not* implied — callers wire the rest of the cluster
    /// up with `node_add`; a single-node deployment needs no `node_add` call
    /// at all, since `this_node` itself always counts toward quorum).
    pub fn new(this_node: NodeId, config: RaftConfig, storage: S, transport: T, apply: A) -> Self {
        let rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let mut server = Self {
            this_node,
            current_term: 0,
            voted_for: None,
            leader: None,
            role: RoleFsm::new(),
            log: Log::new(),
            nodes: NodeTable::new(),
            commit_index: 0,
            last_applied: 0,
            elapsed_timeout: Duration::ZERO,
            election_timeout_rand: config.election_timeout,
            config,
            rng,
            next_entry_id: 0,
            storage,
            transport,
            apply_machine: apply,
        };
        server.reset_election_timer();
        server
    }

    // -- accessors -----------------------------------------------------

    pub fn this_node(&self) -> NodeId {
        self.this_node
    }

    pub fn role(&self) -> Role {
        self.role.state()
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Direct access to the transport port. The RPC handlers below return
    /// their response rather than send it themselves (the caller decides
    /// how to route a reply back to the peer that asked); this accessor is
    /// for callers — such as the `runtime` feature's dispatch loop — that
    /// want to push that reply through the same `Transport` the Server
    /// uses for its own outbound sends, instead of wiring a second channel.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_leader(&self) -> bool {
        self.role.state() == Role::Leader
    }

    /// Checks the invariants that must hold for any role/term/vote/commit
    /// combination. Exposed so tests can assert it holds after every
    /// handler/tick rather than re-deriving the checks themselves; never
    /// called internally (a failing invariant is a bug, not a recoverable
    /// condition).
    pub fn invariants_hold(&self) -> bool {
        let term_order_ok = self.last_applied <= self.commit_index
            && self.commit_index <= self.log.current_index();
        let leader_votes_self = self.role.state() != Role::Leader
            || (self.leader == Some(self.this_node) && self.voted_for == Some(self.this_node));
        term_order_ok && leader_votes_self
    }

    // -- node table ------------------------------------------------------

    /// Adds a peer (non-voting by default; promote separately once the
    /// membership-change mechanism that isn't this crate's concern decides
    /// to). A no-op if `id` is already known. `ENoMem` once `MAX_PEERS` is
    /// reached.
    pub fn node_add(&mut self, id: NodeId, voting: bool) -> Result<()> {
        if self.nodes.contains(id) {
            return Ok(());
        }
        if self.node_count() >= MAX_PEERS {
            return Err(RaftError::ENoMem);
        }
        self.nodes.insert(Peer::new(id, voting, self.log.current_index()));
        Ok(())
    }

    pub fn node_remove(&mut self, id: NodeId) -> Option<Peer> {
        self.nodes.remove(id)
    }

    fn node_count(&self) -> usize {
        self.nodes.iter().count()
    }

    /// Looks up `id`, auto-adding it as a non-voting peer if unrecognized.
    /// This crate always performs the auto-add (never "skips" it), so the
    /// `node_not_found` vote result is unreachable from `recv_vote_request`
    /// here — it is reserved for an embedder whose transport resolves peer
    /// identity itself and chooses not to auto-add (see recv_vote_response's
    /// symmetric no-op handling of it).
    fn ensure_peer(&mut self, id: NodeId) -> Result<()> {
        if self.nodes.contains(id) {
            return Ok(());
        }
        if self.node_count() >= MAX_PEERS {
            return Err(RaftError::ENoMem);
        }
        self.nodes
            .insert(Peer::new(id, false, self.log.current_index()));
        Ok(())
    }

    // -- quorum arithmetic -------------------------------------------------

    /// Voting, active nodes, including `this_node` (which is not itself an
    /// entry in the node table).
    fn num_voting_active(&self) -> usize {
        1 + self.nodes.voting_active()
    }

    fn majority(&self) -> usize {
        (self.num_voting_active() / 2) + 1
    }

    fn votes_received(&self) -> usize {
        let self_vote = (self.voted_for == Some(self.this_node)) as usize;
        let peer_votes = self
            .nodes
            .iter()
            .filter(|p| p.voting && p.active && p.voted_for_me)
            .count();
        self_vote + peer_votes
    }

    fn has_majority(&self) -> bool {
        self.votes_received() >= self.majority()
    }

    // -- persistence-gated primitives ------------------------------------

    /// Writes `term` and clears the vote durably, then mirrors both in
    /// memory. Only ever called to *increase* the term — callers assert
    /// that before calling.
    fn adopt_term(&mut self, term: Term) -> Result<()> {
        debug_assert!(term > self.current_term, "adopt_term must strictly increase the term");
        self.storage.persist_term(term).map_err(RaftError::Port)?;
        self.storage.persist_vote(None).map_err(RaftError::Port)?;
        self.current_term = term;
        self.voted_for = None;
        self.step_down_on_higher_term();
        Ok(())
    }

    /// Demotes to follower using whichever table event is valid for the
    /// current role (`high_term` from leader, `new_term` from candidate;
    /// a follower has nothing to fire). Always clears `leader` and resets
    /// the election timer, matching §4.2's "on becoming follower (from any
    /// state)" rule.
    fn step_down_on_higher_term(&mut self) {
        let event = match self.role.state() {
            Role::Leader => Some(Event::HighTerm),
            Role::Candidate => Some(Event::NewTerm),
            Role::Follower => None,
        };
        if let Some(event) = event {
            if let Some(next) = self.role.transition(event) {
                self.role.commit(next);
            }
        }
        self.leader = None;
        self.reset_election_timer();
    }

    fn persist_vote(&mut self, voted_for: Option<NodeId>) -> Result<()> {
        self.storage.persist_vote(voted_for).map_err(RaftError::Port)?;
        self.voted_for = voted_for;
        Ok(())
    }

    fn append_entry(&mut self, entry: LogEntry) -> Result<LogIndex> {
        let index = self.log.current_index() + 1;
        self.storage
            .persist_entry(&entry, index)
            .map_err(RaftError::Port)?;
        Ok(self.log.append(entry))
    }

    /// Removes every entry at index `>= max(index, base()+1)`, tail first,
    /// persisting each deletion before it happens. Stops (with entries
    /// already removed staying removed) the moment persistence fails.
    /// Rejects `index == 0` outright.
    fn truncate_from(&mut self, index: LogIndex) -> Result<()> {
        if index == 0 {
            return Err(RaftError::Fail("truncate_from(0) is rejected"));
        }
        let target = index.max(self.log.base() + 1);
        while self.log.current_index() >= target {
            let doomed = self.log.current_index();
            self.storage
                .persist_tail_truncate(doomed)
                .map_err(RaftError::Port)?;
            self.log.pop_back();
        }
        Ok(())
    }

    /// Removes the oldest held entry, advancing `base` by one. Rejects an
    /// empty log.
    pub fn poll(&mut self) -> Result<(LogIndex, LogEntry)> {
        if self.log.is_empty() {
            return Err(RaftError::Fail("poll on an empty log"));
        }
        let index = self.log.base() + 1;
        self.storage
            .persist_head_poll(index)
            .map_err(RaftError::Port)?;
        self.log
            .pop_front()
            .ok_or(RaftError::Fail("poll on an empty log"))
    }

    fn reset_election_timer(&mut self) {
        self.elapsed_timeout = Duration::ZERO;
        let base_ms = self.config.election_timeout.as_millis().max(1) as u64;
        let jitter = if base_ms > 1 {
            self.rng.random_range(0..base_ms - 1)
        } else {
            0
        };
        self.election_timeout_rand = Duration::from_millis(base_ms + jitter);
    }

    // -- proposing entries (leader only) ----------------------------------

    /// Appends a user entry at `current_index() + 1` with the current term.
    /// Only valid while leader.
    pub fn propose(&mut self, payload: Vec<u8>) -> Result<LogIndex> {
        if self.role.state() != Role::Leader {
            return Err(RaftError::Fail("only the leader may propose entries"));
        }
        self.next_entry_id += 1;
        let entry = LogEntry::user(self.current_term, self.next_entry_id, payload);
        let index = self.append_entry(entry)?;
        // A leader's own log always counts toward its majority (see
        // advance_commit_index), so a single-voting-node cluster commits a
        // proposal the instant it is appended, with no AppendEntriesResponse
        // round-trip needed to notice.
        self.advance_commit_index();
        self.apply_committed();
        Ok(index)
    }

    // -- elections ---------------------------------------------------------

    /// Starts (or restarts) an election: valid from `follower` and from
    /// `candidate` itself (a new round after a split vote). Bumps the term,
    /// votes for self, clears peer vote flags and the known leader, resets
    /// the election timer, and sends a `VoteRequest` to every active voting
    /// peer.
    pub fn election_start(&mut self) -> Result<()> {
        let next_role = self
            .role
            .transition(Event::Election)
            .ok_or(RaftError::Fail("election is not valid from the current role"))?;
        let next_term = self.current_term + 1;

        self.storage.persist_term(next_term).map_err(RaftError::Port)?;
        self.storage
            .persist_vote(Some(self.this_node))
            .map_err(RaftError::Port)?;

        self.current_term = next_term;
        self.role.commit(next_role);
        self.nodes.clear_votes();
        self.voted_for = Some(self.this_node);
        self.leader = None;
        self.reset_election_timer();

        tracing::info!(
            node_id = %self.this_node,
            term = self.current_term,
            "starting election"
        );

        let req = VoteRequest {
            term: self.current_term,
            candidate_id: self.this_node,
            last_log_idx: self.log.current_index(),
            last_log_term: self.log.current_term(),
        };
        let targets: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|p| p.voting && p.active)
            .map(|p| p.id)
            .collect();
        for id in targets {
            self.transport.send(id, Message::VoteRequest(req.clone()));
        }

        // A single-voting-node cluster is its own majority the instant it
        // votes for itself.
        if self.has_majority() {
            self.become_leader()?;
        }

        Ok(())
    }

    fn become_leader(&mut self) -> Result<()> {
        let next = self
            .role
            .transition(Event::Majority)
            .ok_or(RaftError::Fail("majority is not valid from the current role"))?;
        self.role.commit(next);
        self.leader = Some(self.this_node);

        tracing::info!(node_id = %self.this_node, term = self.current_term, "became leader");

        let current_index = self.log.current_index();
        for peer in self.nodes.iter_mut() {
            peer.next_index = current_index + 1;
            peer.match_index = 0;
        }

        self.elapsed_timeout = Duration::ZERO;
        self.send_heartbeats();
        Ok(())
    }

    // -- vote RPCs -----------------------------------------------------

    pub fn recv_vote_request(&mut self, req: VoteRequest) -> Result<VoteResponse> {
        self.ensure_peer(req.candidate_id)?;
        let candidate = req.candidate_id;

        // Sticky leader rule: while we hold a live lease on a known leader,
        // ignore vote requests from anyone else, to resist disruption by a
        // partitioned candidate. A leader never sticks for itself — `leader`
        // is always `this_node` while we are leader, and a proven higher
        // term below must still be able to demote us; a candidate's `leader`
        // is always `None` (cleared on becoming candidate), so the check is
        // vacuous there too. Only a follower can actually be "sticking" to
        // someone else's leadership.
        if self.role.state() == Role::Follower
            && self.leader.is_some()
            && self.leader != Some(candidate)
            && self.elapsed_timeout < self.election_timeout_rand
        {
            return Ok(VoteResponse {
                term: self.current_term,
                vote: VoteResult::NotGranted,
            });
        }

        if req.term > self.current_term {
            if self.adopt_term(req.term).is_err() {
                return Ok(VoteResponse {
                    term: self.current_term,
                    vote: VoteResult::NotGranted,
                });
            }
        }

        let peer_voting = self
            .nodes
            .get(candidate)
            .map(|p| p.voting)
            .unwrap_or(false);
        let log_up_to_date = self.candidate_log_up_to_date(&req);
        let grant = peer_voting
            && req.term >= self.current_term
            && self.voted_for.is_none()
            && log_up_to_date;

        if grant {
            assert_eq!(
                self.role.state(),
                Role::Follower,
                "a candidate or leader granting a vote would violate the voted-for-self invariant"
            );
            if self.persist_vote(Some(candidate)).is_err() {
                return Ok(VoteResponse {
                    term: self.current_term,
                    vote: VoteResult::NotGranted,
                });
            }
            self.leader = None;
            self.reset_election_timer();
            tracing::debug!(node_id = %self.this_node, candidate = %candidate, term = self.current_term, "granted vote");
            return Ok(VoteResponse {
                term: self.current_term,
                vote: VoteResult::Granted,
            });
        }

        Ok(VoteResponse {
            term: self.current_term,
            vote: VoteResult::NotGranted,
        })
    }

    /// Candidate's log is at least as up-to-date as ours iff it has a higher
    /// last-entry term, or an equal term and an index at least as large.
    fn candidate_log_up_to_date(&self, req: &VoteRequest) -> bool {
        let i = self.log.current_index();
        if i == 0 {
            return true;
        }
        let t = self.log.current_term();
        t < req.last_log_term || (t == req.last_log_term && i <= req.last_log_idx)
    }

    pub fn recv_vote_response(&mut self, from: NodeId, resp: VoteResponse) -> Result<()> {
        if self.role.state() != Role::Candidate {
            return Ok(());
        }
        if resp.term > self.current_term {
            self.adopt_term(resp.term)?;
            return Ok(());
        }
        if resp.term != self.current_term {
            return Ok(()); // stale reply from an earlier term
        }
        match resp.vote {
            VoteResult::Granted => {
                if let Some(peer) = self.nodes.get_mut(from) {
                    peer.voted_for_me = true;
                }
                if self.has_majority() {
                    self.become_leader()?;
                }
            }
            VoteResult::NotGranted | VoteResult::NodeNotFound | VoteResult::Err => {}
        }
        Ok(())
    }

    // -- append-entries RPCs -----------------------------------------------

    pub fn recv_appendentries_request(
        &mut self,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        if req.term > self.current_term {
            self.adopt_term(req.term)?;
        }
        if req.term < self.current_term {
            return Ok(AppendEntriesResponse {
                term: self.current_term,
                success: false,
                current_idx: self.log.current_index(),
                first_idx: 0,
            });
        }

        // term == current_term here: any candidate or (a buggy) second
        // leader at this term steps down to follower under the incoming
        // leader's authority.
        match self.role.state() {
            Role::Candidate => {
                if let Some(next) = self.role.transition(Event::NewLeader) {
                    self.role.commit(next);
                }
            }
            Role::Leader => {
                debug_assert!(
                    req.leader_id == self.this_node,
                    "two leaders observed at the same term"
                );
            }
            Role::Follower => {}
        }

        self.leader = Some(req.leader_id);
        self.reset_election_timer();

        if req.prev_log_idx > 0 {
            match self.log.term_at(req.prev_log_idx) {
                Some(t) if t == req.prev_log_term => {}
                _ => {
                    return Ok(AppendEntriesResponse {
                        term: self.current_term,
                        success: false,
                        current_idx: self.log.current_index(),
                        first_idx: 0,
                    });
                }
            }
        }

        let first_idx = if req.entries.is_empty() {
            0
        } else {
            let first_new_index = req.prev_log_idx + 1;
            if first_new_index <= self.log.current_index() {
                self.truncate_from(first_new_index)?;
            }
            for entry in req.entries {
                self.append_entry(entry)?;
            }
            first_new_index
        };

        if req.leader_commit > self.commit_index {
            self.commit_index = req.leader_commit.min(self.log.current_index());
        }
        self.apply_committed();

        Ok(AppendEntriesResponse {
            term: self.current_term,
            success: true,
            current_idx: self.log.current_index(),
            first_idx,
        })
    }

    pub fn recv_appendentries_response(
        &mut self,
        from: NodeId,
        resp: AppendEntriesResponse,
    ) -> Result<()> {
        if resp.term > self.current_term {
            self.adopt_term(resp.term)?;
            return Ok(());
        }
        if self.role.state() != Role::Leader || resp.term != self.current_term {
            return Ok(());
        }
        if let Some(peer) = self.nodes.get_mut(from) {
            if resp.success {
                peer.match_index = resp.current_idx;
                peer.next_index = resp.current_idx + 1;
            } else {
                peer.next_index = peer.next_index.saturating_sub(1).max(1);
            }
        }
        self.advance_commit_index();
        self.apply_committed();
        Ok(())
    }

    /// The Raft commit rule: a majority of voting peers' `match_index`
    /// reaching `N`, with the entry at `N` from the current term, advances
    /// `commit_index` to `N`. Entries from prior terms are never committed
    /// directly by counting replicas.
    fn advance_commit_index(&mut self) {
        let current_index = self.log.current_index();
        let majority = self.majority();
        let mut new_commit = self.commit_index;
        for n in (self.commit_index + 1)..=current_index {
            if self.log.term_at(n) != Some(self.current_term) {
                continue;
            }
            let mut count = 1; // the leader's own log always matches
            for peer in self.nodes.iter() {
                if peer.voting && peer.active && peer.match_index >= n {
                    count += 1;
                }
            }
            if count >= majority {
                new_commit = n;
            }
        }
        if new_commit > self.commit_index {
            self.commit_index = new_commit;
        }
    }

    fn apply_committed(&mut self) {
        while self.last_applied < self.commit_index {
            let next = self.last_applied + 1;
            if let Some(entry) = self.log.at(next).cloned() {
                self.apply_machine.apply(next, &entry);
            }
            self.last_applied = next;
        }
    }

    /// Builds and sends the next `AppendEntriesRequest` for `peer_id` from
    /// its `next_index`. A no-op if `peer_id` is unknown.
    pub fn send_appendentries(&mut self, peer_id: NodeId) {
        let (next_index, prev_log_idx) = match self.nodes.get(peer_id) {
            Some(peer) => (peer.next_index, peer.next_index.saturating_sub(1)),
            None => return,
        };
        let prev_log_term = self.log.term_at(prev_log_idx).unwrap_or(0);
        let current_index = self.log.current_index();
        let entries: Vec<LogEntry> = if next_index <= current_index {
            (next_index..=current_index)
                .filter_map(|i| self.log.at(i).cloned())
                .collect()
        } else {
            Vec::new()
        };

        let req = AppendEntriesRequest {
            term: self.current_term,
            leader_id: self.this_node,
            prev_log_idx,
            prev_log_term,
            leader_commit: self.commit_index,
            entries,
        };
        self.transport.send(peer_id, Message::AppendEntriesRequest(req));
    }

    fn send_heartbeats(&mut self) {
        let targets: Vec<NodeId> = self.nodes.iter().filter(|p| p.active).map(|p| p.id).collect();
        for id in targets {
            self.send_appendentries(id);
        }
    }

    // -- periodic tick -------------------------------------------------

    /// Advances the timing state by `dt` and, depending on role and which
    /// deadline has elapsed, becomes leader (single-voting-node cluster),
    /// dispatches heartbeats (leader, `request_timeout` elapsed), or starts
    /// an election (non-leader, randomized election deadline elapsed).
    pub fn periodic(&mut self, dt: Duration) -> Result<()> {
        self.elapsed_timeout += dt;

        if self.num_voting_active() == 1 && self.role.state() != Role::Leader {
            return self.election_start();
        }

        if self.role.state() == Role::Leader {
            if self.elapsed_timeout >= self.config.request_timeout {
                self.send_heartbeats();
                self.elapsed_timeout = Duration::ZERO;
            }
        } else if self.elapsed_timeout >= self.election_timeout_rand {
            self.election_start()?;
        }
        Ok(())
    }
}
