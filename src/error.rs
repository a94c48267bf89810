//! Error taxonomy for the juice plant.

use crate::orange::State;
use crate::types::OrangeId;

/// Errors produced by oranges, workers, plants and the cluster.
#[derive(Debug, thiserror::Error)]
pub enum PlantError {
    /// An orange already in the terminal state was asked to advance.
    #[error("orange {id} has already been processed")]
    AlreadyProcessed { id: OrangeId },

    /// A worker received an orange that does not belong to its stage.
    #[error("orange {id} is {found:?}, worker expects {expected:?}")]
    WrongStage {
        id: OrangeId,
        expected: State,
        found: State,
    },

    /// Roster or policy values that cannot run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A plant's coordinating thread exited without reporting back.
    #[error("coordinating thread of {plant} panicked")]
    CoordinatorPanicked { plant: String },

    /// Lifecycle call made from the wrong state (e.g. starting twice).
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PlantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_processed_displays_id() {
        let err = PlantError::AlreadyProcessed { id: 9 };
        assert_eq!(err.to_string(), "orange 9 has already been processed");
    }

    #[test]
    fn wrong_stage_names_both_states() {
        let err = PlantError::WrongStage {
            id: 3,
            expected: State::Peeled,
            found: State::Fetched,
        };
        assert_eq!(err.to_string(), "orange 3 is Fetched, worker expects Peeled");
    }

    #[test]
    fn spawn_failure_wraps_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads");
        let err = PlantError::from(io);
        assert!(matches!(err, PlantError::Spawn(_)));
        assert!(err.to_string().contains("no threads"));
    }

    #[test]
    fn coordinator_panic_names_the_plant() {
        let err = PlantError::CoordinatorPanicked {
            plant: "plant-2".to_string(),
        };
        assert_eq!(err.to_string(), "coordinating thread of plant-2 panicked");
    }
}
