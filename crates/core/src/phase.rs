//! Coarse-grained lifecycle phase for the whole runtime (§4.2).
//!
//! Distinct from `ServerState` (per-server) — this tracks the process as a
//! whole, from first boot through shutdown.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Initializing,
    Loading,
    Ready,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl Phase {
    /// The allowed-transition table from §4.2. Same-phase self-loops are
    /// always allowed.
    fn allowed(self, to: Phase) -> bool {
        use Phase::*;
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Initializing, Loading)
                | (Initializing, Ready)
                | (Initializing, Starting)
                | (Initializing, Error)
                | (Loading, Ready)
                | (Loading, Starting)
                | (Loading, Error)
                | (Ready, Starting)
                | (Ready, Stopping)
                | (Ready, Running)
                | (Ready, Error)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
                | (Stopped, Starting)
                | (Stopped, Ready)
                | (Stopped, Error)
                | (Error, Starting)
                | (Error, Stopping)
                | (Error, Ready)
        )
    }
}

/// Guards `Phase` transitions against the allowed-transition table,
/// logging and rejecting anything outside it instead of panicking (I6).
pub struct PhaseMachine {
    current: Mutex<Phase>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Phase::Initializing),
        }
    }

    pub fn current(&self) -> Phase {
        *self.current.lock()
    }

    /// Attempt a transition. Returns `true` and updates state on success;
    /// on rejection, leaves state unchanged and returns `false` without
    /// panicking.
    pub fn try_transition(&self, to: Phase) -> bool {
        let mut guard = self.current.lock();
        if guard.allowed(to) {
            log::debug!("phase transition: {:?} -> {:?}", *guard, to);
            *guard = to;
            true
        } else {
            log::warn!("rejected phase transition: {:?} -> {:?}", *guard, to);
            false
        }
    }

    /// Force a transition outside the allowed-table, bypassing validation.
    /// Reserved for operator-driven recovery paths (§9 SetPhase).
    pub fn set_unchecked(&self, to: Phase) {
        let mut guard = self.current.lock();
        log::warn!("forced phase transition: {:?} -> {:?}", *guard, to);
        *guard = to;
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
