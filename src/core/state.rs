//! Observable lifecycle of the agent.
//!
//! The scheduler publishes its current phase and cycle number on a `watch`
//! channel. Nothing in the collection path depends on it; it exists for
//! logging and for tests that need to see where the loop is.

use std::fmt;

use tokio::sync::watch;
use tracing::trace;

/// Where the agent is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ResolvingHostname,
    Probing,
    AwaitingBarrier,
    Sending,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "Init",
            Phase::ResolvingHostname => "ResolvingHostname",
            Phase::Probing => "Probing",
            Phase::AwaitingBarrier => "AwaitingBarrier",
            Phase::Sending => "Sending",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase plus the number of the cycle it belongs to (0 before the first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentState {
    pub phase: Phase,
    pub cycle: u64,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cycle {})", self.phase, self.cycle)
    }
}

/// Shared publisher of [`AgentState`].
#[derive(Debug, Clone)]
pub struct StateTracker {
    state_tx: watch::Sender<AgentState>,
    state_rx: watch::Receiver<AgentState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(AgentState {
            phase: Phase::Init,
            cycle: 0,
        });
        Self { state_tx, state_rx }
    }

    pub fn current(&self) -> AgentState {
        *self.state_rx.borrow()
    }

    /// Moves to `phase` within the current cycle.
    pub fn set_phase(&self, phase: Phase) {
        self.state_tx.send_modify(|state| state.phase = phase);
        trace!("Agent state: {}", self.current());
    }

    /// Starts the next cycle in the `Probing` phase and returns its number.
    pub fn begin_cycle(&self) -> u64 {
        self.state_tx.send_modify(|state| {
            state.cycle += 1;
            state.phase = Phase::Probing;
        });
        self.current().cycle
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
