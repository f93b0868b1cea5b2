use std::time::Duration;

use crate::models::QueryState;

/// Where the polling loop believes an execution is, based on the last check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PollPhase {
    /// No valid state observed yet, or the last check returned none.
    Unknown,
    Intermediate(QueryState),
    Terminal(QueryState),
}

impl PollPhase {
    pub fn observe(state: Option<QueryState>) -> Self {
        match state {
            None => Self::Unknown,
            Some(state) if state.is_terminal() => Self::Terminal(state),
            Some(state) => Self::Intermediate(state),
        }
    }

    pub fn state(self) -> Option<QueryState> {
        match self {
            Self::Unknown => None,
            Self::Intermediate(state) | Self::Terminal(state) => Some(state),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Result of `poll_query_status`. Only `Terminal` phases carry a final state;
/// a spent attempt budget reports whatever the last check saw.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PollOutcome {
    pub phase: PollPhase,
    pub attempts: u32,
}

impl PollOutcome {
    pub fn state(&self) -> Option<QueryState> {
        self.phase.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PollPhase;
    use crate::models::QueryState;

    #[test]
    fn observe_classifies_states() {
        assert_eq!(PollPhase::observe(None), PollPhase::Unknown);
        assert_eq!(
            PollPhase::observe(Some(QueryState::Queued)),
            PollPhase::Intermediate(QueryState::Queued)
        );
        assert_eq!(
            PollPhase::observe(Some(QueryState::Cancelled)),
            PollPhase::Terminal(QueryState::Cancelled)
        );
    }

    #[test]
    fn only_terminal_phase_is_terminal() {
        assert!(!PollPhase::Unknown.is_terminal());
        assert!(!PollPhase::Intermediate(QueryState::Running).is_terminal());
        assert!(PollPhase::Terminal(QueryState::Failed).is_terminal());
        assert_eq!(PollPhase::Unknown.state(), None);
    }
}
