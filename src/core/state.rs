// Radio activity state machine
// Driven by progress messages: receiver busy/not busy and PTT activated/deactivated

use crate::ccdi::ProgressType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// What the radio is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RadioState {
    /// Receiver idle, only noise on channel
    #[default]
    ReceivingNoise,
    /// Receiver busy with a signal
    ReceivingSignal,
    Transmitting,
}

impl RadioState {
    /// State after a progress message, or `None` if the message leaves
    /// the radio in `self`
    ///
    /// Targets do not depend on the current state, so a lost frame is
    /// corrected by the next progress message of the right kind.
    pub fn next(self, progress: ProgressType) -> Option<RadioState> {
        use RadioState::*;
        let next = match progress {
            ProgressType::ReceiverBusy => ReceivingSignal,
            ProgressType::ReceiverNotBusy | ProgressType::PttMicDeactivated => ReceivingNoise,
            ProgressType::PttMicActivated => Transmitting,
            _ => return None,
        };
        (next != self).then_some(next)
    }

    pub fn is_receiving(self) -> bool {
        matches!(self, RadioState::ReceivingNoise | RadioState::ReceivingSignal)
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RadioState::ReceivingNoise => "receiving noise",
            RadioState::ReceivingSignal => "receiving signal",
            RadioState::Transmitting => "transmitting",
        };
        write!(f, "{}", name)
    }
}

/// A `(from, to)` state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: RadioState,
    pub to: RadioState,
}

/// Current state plus the time the current transmit burst started
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: RadioState,
    transmit_started: Option<Instant>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Apply a progress message, returning the transition if one happened
    pub fn apply(&mut self, progress: ProgressType) -> Option<Transition> {
        self.apply_at(progress, Instant::now())
    }

    /// Apply a progress message observed at `now`
    pub fn apply_at(&mut self, progress: ProgressType, now: Instant) -> Option<Transition> {
        let from = self.state;
        let to = from.next(progress)?;

        self.state = to;
        self.transmit_started = (to == RadioState::Transmitting).then_some(now);

        Some(Transition { from, to })
    }

    /// Time spent in the current transmit burst, `None` when not transmitting
    pub fn time_transmitting(&self) -> Option<Duration> {
        self.transmit_started.map(|started| started.elapsed())
    }

    /// Instant the current transmit burst started
    pub fn transmit_started(&self) -> Option<Instant> {
        self.transmit_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = StateMachine::new();
        assert_eq!(machine.state(), RadioState::ReceivingNoise);
        assert!(machine.time_transmitting().is_none());
    }

    #[test]
    fn test_busy_ptt_sequence() {
        let mut machine = StateMachine::new();
        let transitions: Vec<Transition> = [
            ProgressType::ReceiverBusy,
            ProgressType::PttMicActivated,
            ProgressType::PttMicDeactivated,
        ]
        .into_iter()
        .filter_map(|progress| machine.apply(progress))
        .collect();

        assert_eq!(
            transitions,
            vec![
                Transition {
                    from: RadioState::ReceivingNoise,
                    to: RadioState::ReceivingSignal
                },
                Transition {
                    from: RadioState::ReceivingSignal,
                    to: RadioState::Transmitting
                },
                Transition {
                    from: RadioState::Transmitting,
                    to: RadioState::ReceivingNoise
                },
            ]
        );
    }

    #[test]
    fn test_repeated_progress_is_not_a_transition() {
        let mut machine = StateMachine::new();
        assert!(machine.apply(ProgressType::ReceiverNotBusy).is_none());
        assert!(machine.apply(ProgressType::ReceiverBusy).is_some());
        assert!(machine.apply(ProgressType::ReceiverBusy).is_none());
        assert!(machine.apply(ProgressType::TxInhibited).is_none());
    }

    #[test]
    fn test_recovers_after_lost_deactivation() {
        let mut machine = StateMachine::new();
        machine.apply(ProgressType::PttMicActivated);

        // PttMicDeactivated never arrived
        assert_eq!(
            machine.apply(ProgressType::ReceiverBusy),
            Some(Transition {
                from: RadioState::Transmitting,
                to: RadioState::ReceivingSignal
            })
        );
        assert!(machine.transmit_started().is_none());
        assert!(machine.apply(ProgressType::ReceiverNotBusy).is_some());
        assert_eq!(machine.state(), RadioState::ReceivingNoise);
    }

    #[test]
    fn test_deactivation_without_transmit() {
        let mut machine = StateMachine::new();
        machine.apply(ProgressType::ReceiverBusy);
        assert_eq!(
            machine.apply(ProgressType::PttMicDeactivated),
            Some(Transition {
                from: RadioState::ReceivingSignal,
                to: RadioState::ReceivingNoise
            })
        );
    }

    #[test]
    fn test_repeated_ptt_keeps_transmit_timer() {
        let mut machine = StateMachine::new();
        let start = Instant::now();
        machine.apply_at(ProgressType::PttMicActivated, start);
        assert!(machine.apply(ProgressType::PttMicActivated).is_none());
        assert_eq!(machine.transmit_started(), Some(start));
    }

    #[test]
    fn test_transmit_timer() {
        let mut machine = StateMachine::new();
        let start = Instant::now();
        machine.apply_at(ProgressType::PttMicActivated, start);
        assert_eq!(machine.transmit_started(), Some(start));
        assert!(machine.time_transmitting().is_some());

        machine.apply(ProgressType::PttMicDeactivated);
        assert!(machine.transmit_started().is_none());
    }
}
