// Managed drive for embedders already on Tokio (feature `runtime`).
//
// `RaftRunner` is sugar over the manual-drive shape every embedder can use
// without this feature. It owns exactly one `Server` behind a mutex, spawns
// a ticking task and a message-dispatch task, and never holds the lock
// across an `.await` — the core's reentrant-free guarantee is preserved,
// it is just Tokio doing the polling instead of the embedder's own loop.
// This is the one module in the crate that depends on `tokio`; nothing
// under `src/server.rs` or its siblings ever awaits anything.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::ports::{Apply, Storage, Transport};
use crate::rpc::Message;
use crate::server::Server;
use crate::types::NodeId;

/// An inbound RPC envelope as delivered off an embedder's transport:
/// the peer it came from, and the message itself.
pub type Inbound = (NodeId, Message);

/// Drives a `Server` for an embedder that already runs a Tokio executor.
///
/// `spawn` hands back the runner plus the two `JoinHandle`s it started; the
/// embedder's transport is expected to push `(from, message)` pairs into
/// the `mpsc::Sender` returned by [`RaftRunner::inbound`] as they arrive.
/// Dropping the runner does not stop the spawned tasks — call
/// [`RaftRunner::shutdown`] (or abort the handles) to do that.
pub struct RaftRunner<S, T, A>
where
    S: Storage + Send + 'static,
    T: Transport + Send + 'static,
    A: Apply + Send + 'static,
{
    server: Arc<Mutex<Server<S, T, A>>>,
    inbound: mpsc::Sender<Inbound>,
    tick_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

impl<S, T, A> RaftRunner<S, T, A>
where
    S: Storage + Send + 'static,
    T: Transport + Send + 'static,
    A: Apply + Send + 'static,
{
    /// Spawns the tick loop (firing every `tick_interval`) and the message
    /// dispatch loop over a bounded inbound channel of `queue_depth`.
    pub fn spawn(server: Server<S, T, A>, tick_interval: Duration, queue_depth: usize) -> Self {
        let server = Arc::new(Mutex::new(server));
        let (tx, rx) = mpsc::channel(queue_depth);

        let tick_task = tokio::spawn(Self::tick_loop(Arc::clone(&server), tick_interval));
        let dispatch_task = tokio::spawn(Self::dispatch_loop(Arc::clone(&server), rx));

        Self {
            server,
            inbound: tx,
            tick_task,
            dispatch_task,
        }
    }

    /// Sender side of the inbound message queue; wire an embedder's
    /// transport to push `(from, message)` pairs here as they arrive.
    pub fn inbound(&self) -> mpsc::Sender<Inbound> {
        self.inbound.clone()
    }

    /// A clone of the shared handle, for callers that want to `propose` or
    /// read state (`role()`, `commit_index()`, ...) without going through
    /// the RPC/tick paths.
    pub fn handle(&self) -> Arc<Mutex<Server<S, T, A>>> {
        Arc::clone(&self.server)
    }

    /// Aborts both spawned tasks. The `Server` itself is left in whatever
    /// state the last completed handler left it in.
    pub fn shutdown(self) {
        self.tick_task.abort();
        self.dispatch_task.abort();
    }

    async fn tick_loop(server: Arc<Mutex<Server<S, T, A>>>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let mut guard = server.lock().await;
            if let Err(err) = guard.periodic(interval) {
                tracing::warn!(error = %err, "periodic tick rejected");
            }
        }
    }

    async fn dispatch_loop(server: Arc<Mutex<Server<S, T, A>>>, mut rx: mpsc::Receiver<Inbound>) {
        while let Some((from, message)) = rx.recv().await {
            let mut guard = server.lock().await;
            match message {
                Message::VoteRequest(req) => match guard.recv_vote_request(req) {
                    Ok(resp) => guard.transport_mut().send(from, Message::VoteResponse(resp)),
                    Err(err) => tracing::warn!(error = %err, %from, "vote request handler failed"),
                },
                Message::VoteResponse(resp) => {
                    if let Err(err) = guard.recv_vote_response(from, resp) {
                        tracing::warn!(error = %err, %from, "vote response handler failed");
                    }
                }
                Message::AppendEntriesRequest(req) => match guard.recv_appendentries_request(req) {
                    Ok(resp) => guard
                        .transport_mut()
                        .send(from, Message::AppendEntriesResponse(resp)),
                    Err(err) => {
                        tracing::warn!(error = %err, %from, "append-entries request handler failed")
                    }
                },
                Message::AppendEntriesResponse(resp) => {
                    if let Err(err) = guard.recv_appendentries_response(from, resp) {
                        tracing::warn!(error = %err, %from, "append-entries response handler failed");
                    }
                }
            }
        }
    }
}
