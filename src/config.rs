use std::time::Duration;

/// Constructor-only configuration for a [`crate::server::Server`].
///
/// There is no file or CLI loader here — wiring configuration in from disk
/// or argv is an embedder concern, explicitly out of scope for this crate.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Leader heartbeat interval: once leader, an empty append-entries is
    /// sent to every active peer whenever this much time has elapsed since
    /// the last one.
    pub request_timeout: Duration,

    /// Base of the randomized election deadline. The deadline actually used
    /// on any given round is `election_timeout + uniform(0, election_timeout - 1)`,
    /// re-sampled on every role transition.
    pub election_timeout: Duration,

    /// Seed for the injected RNG driving election-timeout randomization.
    /// `None` seeds from OS entropy; tests pass `Some(_)` for reproducibility.
    pub seed: Option<u64>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(200),
            election_timeout: Duration::from_millis(1000),
            seed: None,
        }
    }
}
