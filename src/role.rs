// The role finite state machine.
//
// This is a pure, total function with no callback parameter: `transition`
// computes the prospective next state without mutating anything, and
// `commit` is the only thing that ever changes `self.state`. The Server
// decides whether to call `commit` after it has attempted whatever
// persistence the transition requires, so a failed persist never leaves the
// FSM mid-transition.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Election,
    Majority,
    HighTerm,
    NewTerm,
    NewLeader,
}

#[derive(Debug, Default)]
pub struct RoleFsm {
    state: RoleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoleState(Role);

impl Default for RoleState {
    fn default() -> Self {
        RoleState(Role::Follower)
    }
}

impl RoleFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Role {
        self.state.0
    }

    /// Computes the state `event` would move to from the current state,
    /// without mutating anything. `None` means the event is rejected in the
    /// current state and the caller must leave the role untouched.
    pub fn transition(&self, event: Event) -> Option<Role> {
        use Event::*;
        use Role::*;
        match (self.state.0, event) {
            (Follower, Election) => Some(Candidate),
            (Candidate, Election) => Some(Candidate),
            (Candidate, Majority) => Some(Leader),
            (Candidate, NewLeader) => Some(Follower),
            (Candidate, NewTerm) => Some(Follower),
            (Leader, HighTerm) => Some(Follower),
            _ => None,
        }
    }

    /// Commits a previously computed transition. The Server calls this only
    /// after whatever persistence the transition required has already
    /// succeeded; it never validates the move itself, so a caller that
    /// bypasses `transition` can corrupt the FSM — in practice every call
    /// site threads the value straight through from `transition`.
    pub fn commit(&mut self, next: Role) {
        self.state.0 = next;
    }
}
