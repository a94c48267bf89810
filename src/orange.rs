//! The orange and its fixed processing sequence.

use std::thread;
use std::time::Duration;

use crate::config;
use crate::error::{PlantError, Result};
use crate::types::OrangeId;

/// Processing state of an orange, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Fetched,
    Peeled,
    Squeezed,
    Bottled,
    Processed,
}

impl State {
    /// Next state in the sequence; `None` once processed.
    pub fn next(self) -> Option<State> {
        match self {
            State::Fetched => Some(State::Peeled),
            State::Peeled => Some(State::Squeezed),
            State::Squeezed => Some(State::Bottled),
            State::Bottled => Some(State::Processed),
            State::Processed => None,
        }
    }

    /// Labour needed to move an orange out of this state.
    pub fn work_duration(self) -> Duration {
        let ms = match self {
            State::Fetched => config::FETCHED_WORK_MS,
            State::Peeled => config::PEELED_WORK_MS,
            State::Squeezed => config::SQUEEZED_WORK_MS,
            State::Bottled => config::BOTTLED_WORK_MS,
            State::Processed => config::PROCESSED_WORK_MS,
        };
        Duration::from_millis(ms)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Position in the sequence, starting at 0 for `Fetched`.
    #[cfg(test)]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A unit of work moving through the plant. Owned by exactly one queue or worker at a time.
#[derive(Debug, PartialEq, Eq)]
pub struct Orange {
    id: OrangeId,
    state: State,
}

impl Orange {
    /// Fetch a new orange. Blocks for the `Fetched` work duration.
    pub fn fetch(id: OrangeId) -> Self {
        let orange = Self {
            id,
            state: State::Fetched,
        };
        orange.do_work();
        orange
    }

    pub fn id(&self) -> OrangeId {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Pay the current state's labour, then move to the next state.
    ///
    /// The duration charged is that of the state being left, so the first transition
    /// costs the `Fetched` duration a second time. Fails without sleeping if the orange
    /// is already processed.
    pub fn advance(&mut self) -> Result<State> {
        let next = self
            .state
            .next()
            .ok_or(PlantError::AlreadyProcessed { id: self.id })?;
        self.do_work();
        self.state = next;
        Ok(next)
    }

    fn do_work(&self) {
        // std sleeps cannot be interrupted, so the labour is always paid in full.
        thread::sleep(self.state.work_duration());
    }

    /// Test-only constructor that skips the fetch labour.
    #[cfg(test)]
    pub(crate) fn fresh_for_test(id: OrangeId) -> Self {
        Self {
            id,
            state: State::Fetched,
        }
    }

    /// Test-only constructor placing an orange directly in `state`.
    #[cfg(test)]
    pub(crate) fn in_state_for_test(id: OrangeId, state: State) -> Self {
        Self { id, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Instant;

    #[test]
    fn advances_through_every_state_in_order() {
        let mut orange = Orange::fresh_for_test(1);
        let mut seen = vec![orange.state()];
        while !orange.state().is_terminal() {
            seen.push(orange.advance().expect("advance before terminal"));
        }
        assert_eq!(
            seen,
            vec![
                State::Fetched,
                State::Peeled,
                State::Squeezed,
                State::Bottled,
                State::Processed
            ]
        );
    }

    #[test]
    fn advancing_processed_orange_fails() {
        let mut orange = Orange::in_state_for_test(4, State::Processed);
        let err = orange.advance().expect_err("terminal orange must not advance");
        assert!(matches!(err, PlantError::AlreadyProcessed { id: 4 }));
        // State is unchanged after the failed call.
        assert_eq!(orange.state(), State::Processed);
    }

    #[test]
    fn advance_charges_the_state_being_left() {
        let mut orange = Orange::in_state_for_test(2, State::Peeled);
        let start = Instant::now();
        orange.advance().expect("peeled advances");
        assert!(start.elapsed() >= State::Peeled.work_duration());
        assert_eq!(orange.state(), State::Squeezed);
    }

    #[test]
    fn fetch_pays_fetched_duration() {
        let start = Instant::now();
        let orange = Orange::fetch(0);
        assert!(start.elapsed() >= State::Fetched.work_duration());
        assert_eq!(orange.state(), State::Fetched);
    }

    fn any_state() -> impl Strategy<Value = State> {
        prop_oneof![
            Just(State::Fetched),
            Just(State::Peeled),
            Just(State::Squeezed),
            Just(State::Bottled),
            Just(State::Processed),
        ]
    }

    proptest! {
        #[test]
        fn next_moves_exactly_one_step(state in any_state()) {
            match state.next() {
                Some(next) => prop_assert_eq!(next.index(), state.index() + 1),
                None => prop_assert_eq!(state, State::Processed),
            }
        }

        #[test]
        fn terminal_orange_always_rejects_advance(id in any::<u64>()) {
            let mut orange = Orange::in_state_for_test(id, State::Processed);
            prop_assert!(orange.advance().is_err());
            prop_assert_eq!(orange.state(), State::Processed);
        }
    }
}
