use thiserror::Error;

/// The error currency of the crate.
///
/// Only three things ever come back from a `Server` method as an `Err`: a
/// logical rejection the caller can recover from by re-inspecting state
/// (`Fail`), an allocation failure in the peer/entry tables (`ENoMem`), or a
/// failure bubbled up from an embedder-supplied port (`Port`). Invariant
/// violations — the Server observing a state its own handlers should make
/// unreachable, such as a leader reaching the self-vote branch of
/// `recv_vote_request` — are programmer errors and `panic!`/`debug_assert!`
/// instead of returning here; see the policy note in `server.rs`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaftError {
    #[error("rejected: {0}")]
    Fail(&'static str),

    #[error("allocation failed")]
    ENoMem,

    #[error("port failure: {0}")]
    Port(String),
}

pub type Result<T> = std::result::Result<T, RaftError>;
