//! Polling engine state machine

use std::fmt;

/// Lifecycle state of the polling engine
///
/// `Draining` and `Stopping` mean a poll is still in flight after polling
/// was disallowed; the engine is quiesced once it leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    /// Polling not allowed, nothing in flight
    #[default]
    Idle,
    /// Polling allowed, between iterations
    Ready,
    /// Polling allowed, transaction in flight
    Polling,
    /// Polling disallowed, transaction still in flight
    Draining,
    /// Shutdown requested, transaction still in flight
    Stopping,
    /// Terminal
    Stopped,
}

/// Events that drive [`EngineState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enable,
    Disable,
    BeginIteration,
    EndIteration,
    Shutdown,
}

impl EngineState {
    /// State after `transition`; unchanged where the transition does not apply
    pub fn apply(self, transition: Transition) -> Self {
        use EngineState::*;
        use Transition::*;

        match (self, transition) {
            (Stopped, _) => Stopped,

            (Idle | Ready, Enable) => Ready,
            (Polling | Draining, Enable) => Polling,

            (Idle | Ready, Disable) => Idle,
            (Polling | Draining, Disable) => Draining,

            (Ready, BeginIteration) => Polling,

            (Polling, EndIteration) => Ready,
            (Draining, EndIteration) => Idle,
            (Stopping, EndIteration) => Stopped,

            (Idle | Ready, Shutdown) => Stopped,
            (Polling | Draining, Shutdown) => Stopping,

            (state, _) => state,
        }
    }

    /// Whether new iterations may poll the device
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Ready | Self::Polling)
    }

    /// Whether a poll transaction is in flight
    pub fn is_active(self) -> bool {
        matches!(self, Self::Polling | Self::Draining | Self::Stopping)
    }

    pub fn is_shutting_down(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Polling => "polling",
            Self::Draining => "draining",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EngineState::*;
    use Transition::*;

    const ALL_STATES: [EngineState; 6] = [Idle, Ready, Polling, Draining, Stopping, Stopped];
    const ALL_TRANSITIONS: [Transition; 5] =
        [Enable, Disable, BeginIteration, EndIteration, Shutdown];

    #[test]
    fn test_transition_table() {
        let expected = [
            (Idle, [Ready, Idle, Idle, Idle, Stopped]),
            (Ready, [Ready, Idle, Polling, Ready, Stopped]),
            (Polling, [Polling, Draining, Polling, Ready, Stopping]),
            (Draining, [Polling, Draining, Draining, Idle, Stopping]),
            (Stopping, [Stopping, Stopping, Stopping, Stopped, Stopping]),
            (Stopped, [Stopped; 5]),
        ];

        for (from, row) in expected {
            for (transition, to) in ALL_TRANSITIONS.into_iter().zip(row) {
                assert_eq!(
                    from.apply(transition),
                    to,
                    "{from} --{transition:?}-->"
                );
            }
        }
    }

    #[test]
    fn test_derived_flags() {
        assert!(!Idle.is_allowed() && !Idle.is_active() && !Idle.is_shutting_down());
        assert!(Ready.is_allowed() && !Ready.is_active());
        assert!(Polling.is_allowed() && Polling.is_active());
        assert!(!Draining.is_allowed() && Draining.is_active());
        assert!(Stopping.is_active() && Stopping.is_shutting_down());
        assert!(!Stopped.is_active() && Stopped.is_shutting_down());
    }

    #[test]
    fn test_shutdown_is_absorbing() {
        for state in ALL_STATES {
            let stopping = state.apply(Shutdown);
            assert!(stopping.is_shutting_down());

            for transition in [Enable, Disable, BeginIteration] {
                assert!(stopping.apply(transition).is_shutting_down());
            }
            assert_eq!(stopping.apply(EndIteration), Stopped);
        }
    }

    #[test]
    fn test_only_begin_iteration_starts_activity() {
        for state in ALL_STATES {
            for transition in ALL_TRANSITIONS {
                let next = state.apply(transition);
                if next.is_active() && !state.is_active() {
                    assert_eq!((state, transition), (Ready, BeginIteration));
                }
            }
        }
    }
}
