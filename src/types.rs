//! Shared identifiers and worker roles used across the plant.

use std::fmt;

use crate::orange::State;

/// Identifier of an orange, unique within one plant.
pub type OrangeId = u64;
/// Identifier of a plant within a cluster.
pub type PlantId = usize;

/// The job a worker performs. Each role reads from one queue and writes to the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Fetcher,
    Peeler,
    Squeezer,
    Bottler,
    Processor,
}

impl Role {
    /// Roles in pipeline order; also the order in which a plant stops them.
    pub const ALL: [Role; 5] = [
        Role::Fetcher,
        Role::Peeler,
        Role::Squeezer,
        Role::Bottler,
        Role::Processor,
    ];

    /// Index of the queue this role reads from. `None` for the fetcher.
    pub fn input_queue(self) -> Option<usize> {
        match self {
            Role::Fetcher => None,
            other => Some(other.output_queue() - 1),
        }
    }

    /// Index of the queue this role writes to.
    pub fn output_queue(self) -> usize {
        match self {
            Role::Fetcher => 0,
            Role::Peeler => 1,
            Role::Squeezer => 2,
            Role::Bottler => 3,
            Role::Processor => 4,
        }
    }

    /// State an orange must be in when this role picks it up.
    pub fn input_state(self) -> Option<State> {
        match self {
            Role::Fetcher => None,
            Role::Peeler => Some(State::Fetched),
            Role::Squeezer => Some(State::Peeled),
            Role::Bottler => Some(State::Squeezed),
            Role::Processor => Some(State::Bottled),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Fetcher => "fetcher",
            Role::Peeler => "peeler",
            Role::Squeezer => "squeezer",
            Role::Bottler => "bottler",
            Role::Processor => "processor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
