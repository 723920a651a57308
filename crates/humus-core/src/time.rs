//! Logical time and the run state machine
//!
//! Time in a configuration is logical: it only moves when the host calls
//! `tick()` or `advance()`, which keeps delayed sends reproducible.

use serde::{Deserialize, Serialize};

/// Logical milliseconds
pub type Millis = u64;

/// Configuration clock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Current logical time
    now: Millis,
    /// Number of completed run ticks
    ticks: u64,
}

impl Clock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Number of completed run ticks
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Move time forward by `ms`
    pub fn advance(&mut self, ms: Millis) {
        self.now = self.now.saturating_add(ms);
    }

    /// Move time forward to `at`; never moves backwards
    pub fn advance_to(&mut self, at: Millis) {
        self.now = self.now.max(at);
    }

    /// Count one run tick
    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }
}

/// Whether the configuration is being driven by `tick()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    /// Not running; `tick()` does nothing
    #[default]
    Halted,
    /// Dispatching a batch every `period` ms
    Running { period: Millis },
    /// Idle; the next send resumes at the same period
    Paused { period: Millis },
}

impl RunState {
    /// Check if ticks dispatch work
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }

    /// Check if the configuration is waiting for a send
    pub fn is_paused(&self) -> bool {
        matches!(self, RunState::Paused { .. })
    }

    /// Tick period, if running or paused
    pub fn period(&self) -> Option<Millis> {
        match self {
            RunState::Halted => None,
            RunState::Running { period } | RunState::Paused { period } => Some(*period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock() {
        let mut clock = Clock::new();
        assert_eq!(clock.now(), 0);

        clock.advance(25);
        clock.advance_to(10);
        assert_eq!(clock.now(), 25);

        clock.advance_to(40);
        clock.record_tick();
        assert_eq!(clock.now(), 40);
        assert_eq!(clock.ticks(), 1);
    }

    #[test]
    fn test_run_state() {
        assert_eq!(RunState::default(), RunState::Halted);
        assert_eq!(RunState::Halted.period(), None);
        assert!(RunState::Running { period: 5 }.is_running());
        assert!(RunState::Paused { period: 5 }.is_paused());
        assert_eq!(RunState::Paused { period: 5 }.period(), Some(5));
    }
}
