// A tiny in-process test harness: several `Server`s wired together through
// a shared in-memory mailbox instead of a real transport, and an in-memory
// storage/apply double instead of a real disk and application state
// machine. No `tokio::test` appears anywhere here because the core itself
// is synchronous.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use raft_core::{
    Apply, LogEntry, LogIndex, Message, NodeId, RaftConfig, Server, Storage, Transport,
};

/// An envelope in flight between two in-process servers.
pub struct Envelope {
    pub from: NodeId,
    pub to: NodeId,
    pub message: Message,
}

type Mailbox = Rc<RefCell<VecDeque<Envelope>>>;

/// `Transport` double: every `send` is appended to a shared mailbox tagged
/// with the sending server's id. Delivery is driven explicitly by the test
/// (via [`Cluster::deliver_all`]) rather than happening inline, so tests can
/// inspect in-flight messages and control delivery order.
pub struct ChannelTransport {
    from: NodeId,
    mailbox: Mailbox,
}

impl Transport for ChannelTransport {
    fn send(&mut self, peer: NodeId, message: Message) {
        self.mailbox.borrow_mut().push_back(Envelope {
            from: self.from,
            to: peer,
            message,
        });
    }
}

/// `Storage` double: always succeeds, and records the last term/vote it was
/// asked to persist so a test can assert persistence happened without
/// reaching into `Server`'s private fields.
#[derive(Default, Clone)]
pub struct RecordingStorage {
    pub persisted_term: Rc<RefCell<Option<u64>>>,
    pub persisted_vote: Rc<RefCell<Option<Option<NodeId>>>>,
}

impl Storage for RecordingStorage {
    fn persist_term(&mut self, term: u64) -> Result<(), String> {
        *self.persisted_term.borrow_mut() = Some(term);
        Ok(())
    }

    fn persist_vote(&mut self, voted_for: Option<NodeId>) -> Result<(), String> {
        *self.persisted_vote.borrow_mut() = Some(voted_for);
        Ok(())
    }

    fn persist_entry(&mut self, _entry: &LogEntry, _index: LogIndex) -> Result<(), String> {
        Ok(())
    }

    fn persist_head_poll(&mut self, _index: LogIndex) -> Result<(), String> {
        Ok(())
    }

    fn persist_tail_truncate(&mut self, _index: LogIndex) -> Result<(), String> {
        Ok(())
    }
}

/// `Apply` double: records every committed entry it is handed, in order.
#[derive(Default, Clone)]
pub struct RecordingApply {
    pub applied: Rc<RefCell<Vec<(LogIndex, LogEntry)>>>,
}

impl Apply for RecordingApply {
    fn apply(&mut self, index: LogIndex, entry: &LogEntry) {
        self.applied.borrow_mut().push((index, entry.clone()));
    }
}

pub type TestServer = Server<RecordingStorage, ChannelTransport, RecordingApply>;

/// A cluster of in-process servers sharing one mailbox, each a voting peer
/// of every other. Built with a deterministic RNG seed per node (`100 +
/// id`) so election-timeout jitter is reproducible across test runs.
pub struct Cluster {
    pub servers: HashMap<u64, TestServer>,
    pub storages: HashMap<u64, RecordingStorage>,
    pub applies: HashMap<u64, RecordingApply>,
    mailbox: Mailbox,
}

impl Cluster {
    pub fn new(ids: &[u64]) -> Self {
        Self::with_config(ids, RaftConfig::default())
    }

    pub fn with_config(ids: &[u64], base_config: RaftConfig) -> Self {
        let mailbox: Mailbox = Rc::new(RefCell::new(VecDeque::new()));
        let mut servers = HashMap::new();
        let mut storages = HashMap::new();
        let mut applies = HashMap::new();

        for &id in ids {
            let storage = RecordingStorage::default();
            let apply = RecordingApply::default();
            let transport = ChannelTransport {
                from: NodeId::from(id),
                mailbox: Rc::clone(&mailbox),
            };
            let config = RaftConfig {
                seed: Some(100 + id),
                ..base_config.clone()
            };
            let mut server = Server::new(NodeId::from(id), config, storage.clone(), transport, apply.clone());
            for &peer in ids {
                if peer != id {
                    server.node_add(NodeId::from(peer), true).unwrap();
                }
            }
            servers.insert(id, server);
            storages.insert(id, storage);
            applies.insert(id, apply);
        }

        Self {
            servers,
            storages,
            applies,
            mailbox,
        }
    }

    pub fn server(&mut self, id: u64) -> &mut TestServer {
        self.servers.get_mut(&id).expect("unknown node id")
    }

    pub fn pending(&self) -> usize {
        self.mailbox.borrow().len()
    }

    /// Discards every envelope currently in flight, simulating the
    /// transport dropping them — explicitly tolerated for vote and
    /// heartbeat traffic.
    pub fn drop_pending(&mut self) {
        self.mailbox.borrow_mut().clear();
    }

    /// Drains the mailbox, handing every envelope to its destination
    /// server's matching handler. Request handlers' responses are re-queued
    /// as replies addressed back to the sender, exactly as a real transport
    /// would round-trip them; this runs until the mailbox is empty or
    /// `max_rounds` envelopes have been processed (a safety bound against
    /// an infeasible infinite reply loop in a broken test).
    pub fn deliver_all(&mut self) {
        self.deliver_up_to(10_000);
    }

    pub fn deliver_up_to(&mut self, max_rounds: usize) {
        let mut processed = 0;
        while processed < max_rounds {
            let envelope = self.mailbox.borrow_mut().pop_front();
            let Some(envelope) = envelope else {
                break;
            };
            processed += 1;
            self.process_envelope(envelope);
        }
    }

    /// Delivers only envelopes whose `from` and `to` both fall in `members`,
    /// leaving everything else in the mailbox untouched and in order. Used
    /// to model a subset of the cluster exchanging messages while the rest
    /// is (for the moment) partitioned away, without needing a real
    /// partition in the transport double.
    pub fn deliver_among(&mut self, members: &[u64]) {
        loop {
            let next = {
                let mailbox = self.mailbox.borrow();
                mailbox
                    .iter()
                    .position(|e| members.contains(&e.from.0) && members.contains(&e.to.0))
            };
            let Some(index) = next else {
                break;
            };
            let envelope = self.mailbox.borrow_mut().remove(index).unwrap();
            self.process_envelope(envelope);
        }
    }

    fn process_envelope(&mut self, envelope: Envelope) {
        let Envelope { from, to, message } = envelope;
        let Some(server) = self.servers.get_mut(&to.0) else {
            return;
        };
        match message {
            Message::VoteRequest(req) => {
                if let Ok(resp) = server.recv_vote_request(req) {
                    self.mailbox.borrow_mut().push_back(Envelope {
                        from: to,
                        to: from,
                        message: Message::VoteResponse(resp),
                    });
                }
            }
            Message::VoteResponse(resp) => {
                let _ = server.recv_vote_response(from, resp);
            }
            Message::AppendEntriesRequest(req) => {
                if let Ok(resp) = server.recv_appendentries_request(req) {
                    self.mailbox.borrow_mut().push_back(Envelope {
                        from: to,
                        to: from,
                        message: Message::AppendEntriesResponse(resp),
                    });
                }
            }
            Message::AppendEntriesResponse(resp) => {
                let _ = server.recv_appendentries_response(from, resp);
            }
        }
    }

    /// Advances every server's clock by `dt`, without delivering any
    /// messages those ticks produce (call [`Cluster::deliver_all`]
    /// afterward for that).
    pub fn tick_all(&mut self, dt: Duration) {
        let mut ids: Vec<u64> = self.servers.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let _ = self.servers.get_mut(&id).unwrap().periodic(dt);
        }
    }
}
