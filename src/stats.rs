//! Derived plant counters and their textual summary.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use crate::types::Role;

/// Number of stage queues in a plant.
pub const STAGE_QUEUES: usize = Role::ALL.len();

const QUEUE_LABELS: [&str; STAGE_QUEUES] =
    ["fetched", "peeled", "squeezed", "bottled", "processed"];

/// Point-in-time counters for one plant or a sum over several.
///
/// Only meaningful once every worker has been stopped; taken while running the
/// numbers race with the workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlantStats {
    pub queue_sizes: [usize; STAGE_QUEUES],
    pub provided: u64,
    pub processed: u64,
    pub bottles: u64,
    pub waste: u64,
}

impl PlantStats {
    /// Build a snapshot from raw readings, deriving bottles and waste.
    pub fn from_counts(
        queue_sizes: [usize; STAGE_QUEUES],
        provided: u64,
        oranges_per_bottle: u64,
    ) -> Self {
        let processed = queue_sizes[STAGE_QUEUES - 1] as u64;
        debug_assert!(provided >= processed, "processed more oranges than fetched");
        Self {
            queue_sizes,
            provided,
            processed,
            bottles: processed / oranges_per_bottle,
            waste: provided.saturating_sub(processed),
        }
    }

    /// Oranges still waiting in a queue before the last stage.
    pub fn in_flight(&self) -> u64 {
        self.queue_sizes[..STAGE_QUEUES - 1]
            .iter()
            .map(|&size| size as u64)
            .sum()
    }

    /// Every provided orange is either processed or resident in an earlier queue.
    pub fn is_conserved(&self) -> bool {
        self.provided == self.processed + self.in_flight() && self.waste == self.in_flight()
    }
}

impl Add for PlantStats {
    type Output = PlantStats;

    fn add(self, other: PlantStats) -> PlantStats {
        let mut queue_sizes = self.queue_sizes;
        for (size, extra) in queue_sizes.iter_mut().zip(other.queue_sizes) {
            *size += extra;
        }
        PlantStats {
            queue_sizes,
            provided: self.provided + other.provided,
            processed: self.processed + other.processed,
            bottles: self.bottles + other.bottles,
            waste: self.waste + other.waste,
        }
    }
}

impl Sum for PlantStats {
    fn sum<I: Iterator<Item = PlantStats>>(iter: I) -> PlantStats {
        iter.fold(PlantStats::default(), Add::add)
    }
}

impl fmt::Display for PlantStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, size) in QUEUE_LABELS.iter().zip(self.queue_sizes) {
            writeln!(f, "Size of {label} queue: {size}")?;
        }
        writeln!(f, "Total provided/processed = {}/{}", self.provided, self.processed)?;
        write!(
            f,
            "Created {} bottles of orange juice, wasted {} oranges",
            self.bottles, self.waste
        )
    }
}
