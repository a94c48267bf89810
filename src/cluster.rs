//! Several isolated plants started and stopped together.

use tracing::{info, warn};

use crate::config::PlantConfig;
use crate::error::{PlantError, Result};
use crate::plant::Plant;
use crate::stats::PlantStats;

/// A set of independent plants. No queue is shared between plants.
pub struct Cluster {
    plants: Vec<Plant>,
}

impl Cluster {
    /// Create `count` idle plants with the same configuration.
    pub fn new(count: usize, config: PlantConfig) -> Result<Self> {
        if count == 0 {
            return Err(PlantError::InvalidConfig(
                "a cluster needs at least one plant".to_string(),
            ));
        }
        let plants = (0..count)
            .map(|id| Plant::new(id, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { plants })
    }

    pub fn plants(&self) -> &[Plant] {
        &self.plants
    }

    /// Start every plant. On failure, plants already started are stopped again.
    pub fn start(&mut self) -> Result<()> {
        info!(plants = self.plants.len(), "starting plant operation");
        for index in 0..self.plants.len() {
            if let Err(err) = self.plants[index].start() {
                warn!(
                    plant = %self.plants[index].label(),
                    error = %err,
                    "plant failed to start"
                );
                self.stop();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Signal every plant to stop, then wait for each to finish its own stop sequence.
    ///
    /// Plants shut down concurrently on their coordinating threads.
    pub fn stop(&mut self) {
        for plant in &self.plants {
            plant.request_stop();
        }
        for plant in &mut self.plants {
            plant.stop();
        }
        info!(plants = self.plants.len(), "plant operation stopped");
    }

    /// Per-plant snapshots, in plant order.
    pub fn plant_stats(&self) -> Vec<PlantStats> {
        self.plants.iter().map(Plant::stats).collect()
    }

    /// Field-wise sum of every plant's snapshot.
    pub fn stats(&self) -> PlantStats {
        self.plants.iter().map(Plant::stats).sum()
    }

    pub fn provided_count(&self) -> u64 {
        self.plants.iter().map(Plant::provided_count).sum()
    }

    pub fn processed_count(&self) -> u64 {
        self.plants.iter().map(Plant::processed_count).sum()
    }

    pub fn bottle_count(&self) -> u64 {
        self.plants.iter().map(Plant::bottle_count).sum()
    }

    pub fn waste_count(&self) -> u64 {
        self.plants.iter().map(Plant::waste_count).sum()
    }
}
