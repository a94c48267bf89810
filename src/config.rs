//! Plant constants, worker roster and run policies.

use std::time::Duration;

use crate::error::{PlantError, Result};
use crate::types::Role;

// Labour per state in milliseconds, charged when an orange leaves the state.
pub const FETCHED_WORK_MS: u64 = 15;
pub const PEELED_WORK_MS: u64 = 38;
pub const SQUEEZED_WORK_MS: u64 = 29;
pub const BOTTLED_WORK_MS: u64 = 17;
pub const PROCESSED_WORK_MS: u64 = 1;

pub const ORANGES_PER_BOTTLE: u64 = 3;
pub const DEFAULT_RUN_DURATION: Duration = Duration::from_secs(5);
pub const DEFAULT_PLANTS: usize = 5;

/// Number of workers per role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roster {
    pub fetchers: usize,
    pub peelers: usize,
    pub squeezers: usize,
    pub bottlers: usize,
    pub processors: usize,
}

impl Default for Roster {
    // Best observed balance of per-stage throughput against per-stage labour.
    fn default() -> Self {
        Self {
            fetchers: 1,
            peelers: 1,
            squeezers: 3,
            bottlers: 2,
            processors: 2,
        }
    }
}

impl Roster {
    pub fn count(&self, role: Role) -> usize {
        match role {
            Role::Fetcher => self.fetchers,
            Role::Peeler => self.peelers,
            Role::Squeezer => self.squeezers,
            Role::Bottler => self.bottlers,
            Role::Processor => self.processors,
        }
    }

    pub fn total(&self) -> usize {
        Role::ALL.iter().map(|&role| self.count(role)).sum()
    }

    /// Parse `fetchers,peelers,squeezers,bottlers,processors`, e.g. `1,1,3,2,2`.
    pub fn parse(arg: &str) -> Result<Self> {
        let mut counts = Vec::with_capacity(Role::ALL.len());
        for part in arg.split(',') {
            let value = part.trim().parse::<usize>().map_err(|_| {
                PlantError::InvalidConfig(format!("roster entry {part:?} is not a count"))
            })?;
            counts.push(value);
        }
        match counts.as_slice() {
            &[fetchers, peelers, squeezers, bottlers, processors] => Ok(Self {
                fetchers,
                peelers,
                squeezers,
                bottlers,
                processors,
            }),
            _ => Err(PlantError::InvalidConfig(format!(
                "roster needs {} counts, got {}",
                Role::ALL.len(),
                counts.len()
            ))),
        }
    }
}

/// How a transform worker waits on an empty input queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PollStrategy {
    /// Retry `try_pop` immediately. Lowest latency, burns a core while idle.
    #[default]
    Spin,
    /// Wait up to the given duration for a push before re-checking the running flag.
    Wait(Duration),
}

impl PollStrategy {
    /// `0` means spin, anything else is a bounded wait in milliseconds.
    pub fn from_wait_ms(ms: u64) -> Self {
        if ms == 0 {
            PollStrategy::Spin
        } else {
            PollStrategy::Wait(Duration::from_millis(ms))
        }
    }
}

/// What happens to oranges still in flight when a plant stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Stop stages in order without draining; leftovers count as waste.
    #[default]
    Truncate,
    /// Stop fetching, then let each stage empty its input queue before stopping it.
    Drain,
}

/// Everything a plant needs to build its workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlantConfig {
    pub roster: Roster,
    pub poll: PollStrategy,
    pub shutdown: ShutdownPolicy,
    pub oranges_per_bottle: u64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            roster: Roster::default(),
            poll: PollStrategy::default(),
            shutdown: ShutdownPolicy::default(),
            oranges_per_bottle: ORANGES_PER_BOTTLE,
        }
    }
}

impl PlantConfig {
    /// Reject configurations that could never move an orange to the end.
    pub fn validate(&self) -> Result<()> {
        for role in Role::ALL {
            if self.roster.count(role) == 0 {
                return Err(PlantError::InvalidConfig(format!(
                    "roster needs at least one {role}"
                )));
            }
        }
        if self.oranges_per_bottle == 0 {
            return Err(PlantError::InvalidConfig(
                "oranges per bottle must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_has_nine_workers() {
        let roster = Roster::default();
        assert_eq!(roster.total(), 9);
        assert_eq!(roster.count(Role::Squeezer), 3);
    }

    #[test]
    fn parses_roster_list() {
        let roster = Roster::parse("2, 1,4,2,1").expect("valid roster");
        assert_eq!(roster.fetchers, 2);
        assert_eq!(roster.squeezers, 4);
        assert_eq!(roster.processors, 1);
    }

    #[test]
    fn rejects_short_or_garbled_roster() {
        assert!(Roster::parse("1,1,3").is_err());
        assert!(Roster::parse("1,x,3,2,2").is_err());
        assert!(Roster::parse("").is_err());
    }

    #[test]
    fn validate_requires_every_role() {
        let mut config = PlantConfig::default();
        assert!(config.validate().is_ok());
        config.roster.bottlers = 0;
        let err = config.validate().expect_err("missing bottler");
        assert!(err.to_string().contains("bottler"));
    }

    #[test]
    fn validate_rejects_empty_bottles() {
        let config = PlantConfig {
            oranges_per_bottle: 0,
            ..PlantConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_wait_means_spin() {
        assert_eq!(PollStrategy::from_wait_ms(0), PollStrategy::Spin);
        assert_eq!(
            PollStrategy::from_wait_ms(5),
            PollStrategy::Wait(Duration::from_millis(5))
        );
    }
}
