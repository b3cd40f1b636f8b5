//! Deadline-based auto-exit, compared against `now` each controller
//! tick rather than driven by a background timer/callback.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoExitState {
    /// No deadline armed (not all hosts are terminal, or auto-exit is
    /// disabled).
    Idle,
    /// Deadline armed but not yet reached.
    Counting { remaining: Duration },
    /// Deadline reached; the controller should shut down.
    Expired,
}

/// Tracks the single deadline used for auto-exit.
#[derive(Debug, Clone)]
pub struct AutoExitManager {
    delay: Duration,
    enabled: bool,
    deadline: Option<Instant>,
}

impl AutoExitManager {
    pub fn new(delay: Duration, enabled: bool) -> Self {
        Self { delay, enabled, deadline: None }
    }

    /// Called once per tick with whether every host is currently
    /// terminal. Arms the deadline only on the transition into
    /// "all terminal"; any non-terminal host clears it. Re-arming with
    /// the same target (i.e. calling this repeatedly while already all
    /// terminal) is a no-op, not a reset, keeping the reset idempotent.
    ///
    /// This is also what makes the deadline track the *last* host to
    /// finish rather than the first: if two hosts finish 60s apart, the
    /// first finish leaves `all_terminal` false (the other host is still
    /// active) so the deadline stays unarmed, and only the second
    /// finish — the one that actually makes every host terminal — arms
    /// it. No separate "push the deadline out" entry point is needed.
    pub fn on_host_terminal(&mut self, all_terminal: bool) {
        if !self.enabled {
            return;
        }
        if all_terminal {
            if self.deadline.is_none() {
                self.deadline = Some(Instant::now() + self.delay);
            }
        } else {
            self.deadline = None;
        }
    }

    pub fn poll(&self, now: Instant) -> AutoExitState {
        match self.deadline {
            None => AutoExitState::Idle,
            Some(deadline) if now >= deadline => AutoExitState::Expired,
            Some(deadline) => AutoExitState::Counting { remaining: deadline - now },
        }
    }
}
