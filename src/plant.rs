//! A single juice plant: five stage queues and the workers wired between them.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{PlantConfig, ShutdownPolicy};
use crate::error::{PlantError, Result};
use crate::stage_queue::StageQueue;
use crate::stats::{PlantStats, STAGE_QUEUES};
use crate::types::{PlantId, Role};
use crate::worker::{Worker, WorkerCounters, WorkerState};

// Polling interval while waiting for a stage to empty during a drain.
const DRAIN_POLL_MS: u64 = 2;
// A drain slower than this is reported once.
const DRAIN_WARN_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlantState {
    Idle,
    Running,
    Stopped,
}

impl PlantState {
    fn as_str(self) -> &'static str {
        match self {
            PlantState::Idle => "idle",
            PlantState::Running => "running",
            PlantState::Stopped => "stopped",
        }
    }
}

/// The plant's own thread. It owns the workers from start until stop.
struct Coordinator {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<Vec<Worker>>,
}

/// One isolated pipeline. Owns its queues; workers only ever see their own two.
pub struct Plant {
    label: String,
    config: PlantConfig,
    queues: [Arc<StageQueue>; STAGE_QUEUES],
    orange_ids: Arc<AtomicU64>,
    workers: Vec<Worker>,
    counters: Vec<Arc<WorkerCounters>>,
    coordinator: Option<Coordinator>,
    state: PlantState,
}

impl Plant {
    /// Create an idle plant labelled `plant-{id}`.
    pub fn new(id: PlantId, config: PlantConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            label: format!("plant-{id}"),
            config,
            queues: std::array::from_fn(|_| Arc::new(StageQueue::new())),
            orange_ids: Arc::new(AtomicU64::new(0)),
            workers: Vec::new(),
            counters: Vec::new(),
            coordinator: None,
            state: PlantState::Idle,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Workers held by the plant. Empty while running, since the coordinating
    /// thread owns them until `stop()` hands them back.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Build the worker roster, in role order, bound to the stage queues.
    pub fn configure(&mut self) -> Result<()> {
        let mut workers = Vec::with_capacity(self.config.roster.total());
        for role in Role::ALL {
            for n in 0..self.config.roster.count(role) {
                let name = format!("{}/{role}-{n}", self.label);
                let output = Arc::clone(&self.queues[role.output_queue()]);
                let worker = match role.input_queue() {
                    None => Worker::fetcher(name, output, Arc::clone(&self.orange_ids)),
                    Some(input) => Worker::transform(
                        name,
                        role,
                        Arc::clone(&self.queues[input]),
                        output,
                        self.config.poll,
                    )?,
                };
                workers.push(worker);
            }
        }
        self.counters = workers.iter().map(Worker::counters).collect();
        self.workers = workers;
        Ok(())
    }

    /// Configure the roster, then start every worker from the plant's coordinating thread.
    ///
    /// Returns once all workers run. If any worker fails to spawn, the ones already
    /// running are stopped again and the error is returned.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PlantState::Idle {
            return Err(PlantError::InvalidTransition {
                action: "start plant",
                state: self.state.as_str(),
            });
        }
        self.configure()?;

        let mut workers = std::mem::take(&mut self.workers);
        let queues = self.queues.clone();
        let label = self.label.clone();
        let shutdown = self.config.shutdown;
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name(self.label.clone())
            .spawn(move || {
                info!(plant = %label, workers = workers.len(), "processing oranges");
                if let Err(err) = start_all(&mut workers) {
                    let _ = ready_tx.send(Err(err));
                    return workers;
                }
                let _ = ready_tx.send(Ok(()));
                // A dropped sender counts as a stop request.
                let _ = stop_rx.recv();
                shut_down(&label, shutdown, &queues, &mut workers);
                workers
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.state = PlantState::Stopped;
                return Err(PlantError::Spawn(err));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.coordinator = Some(Coordinator { stop_tx, handle });
                self.state = PlantState::Running;
                Ok(())
            }
            Ok(Err(err)) => {
                self.reclaim(handle);
                self.state = PlantState::Stopped;
                Err(err)
            }
            Err(_) => {
                self.reclaim(handle);
                self.state = PlantState::Stopped;
                Err(PlantError::CoordinatorPanicked {
                    plant: self.label.clone(),
                })
            }
        }
    }

    /// Signal the coordinating thread to begin shutdown without waiting for it.
    ///
    /// Lets a caller stop several plants at once before joining each with `stop()`.
    pub fn request_stop(&self) {
        if let Some(coordinator) = &self.coordinator {
            let _ = coordinator.stop_tx.send(());
        }
    }

    /// Signal the coordinating thread, wait for its shutdown and take the workers back.
    pub fn stop(&mut self) {
        if self.state != PlantState::Running {
            self.state = PlantState::Stopped;
            return;
        }
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.stop_tx.send(());
            self.reclaim(coordinator.handle);
        }
        self.state = PlantState::Stopped;
        debug_assert!(
            self.workers.iter().all(|w| w.state() == WorkerState::Stopped),
            "worker still running after plant stop"
        );
        debug_assert!(
            self.queues
                .iter()
                .all(|q| q.pushed() == q.popped() + q.len() as u64),
            "stage queue lost track of an orange"
        );
        info!(plant = %self.label, waste = self.waste_count(), "plant stopped");
    }

    fn reclaim(&mut self, handle: JoinHandle<Vec<Worker>>) {
        match handle.join() {
            Ok(workers) => self.workers = workers,
            Err(_) => warn!(plant = %self.label, "coordinating thread panicked"),
        }
    }

    /// Live size of every stage queue, fetched first.
    pub fn queue_sizes(&self) -> [usize; STAGE_QUEUES] {
        std::array::from_fn(|index| self.queues[index].len())
    }

    /// Oranges created by all fetchers.
    pub fn provided_count(&self) -> u64 {
        self.counters.iter().map(|c| c.fetched()).sum()
    }

    /// Oranges that reached the last queue.
    pub fn processed_count(&self) -> u64 {
        self.queues[STAGE_QUEUES - 1].len() as u64
    }

    /// Full bottles; a partial bottle is neither counted nor wasted.
    pub fn bottle_count(&self) -> u64 {
        self.processed_count() / self.config.oranges_per_bottle
    }

    pub fn waste_count(&self) -> u64 {
        self.provided_count().saturating_sub(self.processed_count())
    }

    /// All counters at once. Call after `stop()` for consistent numbers.
    pub fn stats(&self) -> PlantStats {
        PlantStats::from_counts(
            self.queue_sizes(),
            self.provided_count(),
            self.config.oranges_per_bottle,
        )
    }
}

impl Drop for Plant {
    fn drop(&mut self) {
        self.stop();
    }
}

fn start_all(workers: &mut [Worker]) -> Result<()> {
    for index in 0..workers.len() {
        if let Err(err) = workers[index].start() {
            warn!(
                worker = %workers[index].name(),
                error = %err,
                "worker failed to start, rolling back"
            );
            for worker in &mut workers[..index] {
                worker.stop();
            }
            return Err(err);
        }
    }
    Ok(())
}

fn shut_down(
    label: &str,
    shutdown: ShutdownPolicy,
    queues: &[Arc<StageQueue>; STAGE_QUEUES],
    workers: &mut [Worker],
) {
    match shutdown {
        ShutdownPolicy::Truncate => {
            for worker in workers.iter_mut() {
                worker.stop();
            }
        }
        ShutdownPolicy::Drain => {
            for role in Role::ALL {
                if let Some(input) = role.input_queue() {
                    wait_until_drained(label, &queues[input], role, workers);
                }
                for worker in workers.iter_mut().filter(|w| w.role() == role) {
                    worker.stop();
                }
            }
        }
    }
}

// Upstream roles are already joined, so the queue can only shrink while a worker
// of `role` is alive. Once none is, the remainder stays behind as waste.
fn wait_until_drained(label: &str, queue: &StageQueue, role: Role, workers: &[Worker]) {
    let start = Instant::now();
    let mut warned = false;
    while !queue.is_empty() {
        let drainers_alive = workers
            .iter()
            .filter(|w| w.role() == role)
            .any(|w| !w.is_finished());
        if !drainers_alive {
            warn!(
                plant = %label,
                %role,
                remaining = queue.len(),
                "no live worker left to drain the queue"
            );
            return;
        }
        if !warned && start.elapsed() > DRAIN_WARN_AFTER {
            warn!(
                plant = %label,
                %role,
                remaining = queue.len(),
                "drain is taking longer than expected"
            );
            warned = true;
        }
        thread::sleep(Duration::from_millis(DRAIN_POLL_MS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PollStrategy, Roster};
    use crate::orange::{Orange, State};

    fn run_for(config: PlantConfig, duration: Duration) -> Plant {
        let mut plant = Plant::new(0, config).expect("valid config");
        plant.start().expect("plant starts");
        thread::sleep(duration);
        plant.stop();
        plant
    }

    #[test]
    fn short_run_conserves_every_orange() {
        let plant = run_for(PlantConfig::default(), Duration::from_millis(400));
        let stats = plant.stats();

        assert!(stats.provided > 0);
        assert_eq!(stats.provided, stats.processed + stats.waste);
        assert_eq!(stats.provided, stats.processed + stats.in_flight());
        assert_eq!(stats.bottles, stats.processed / 3);
        assert!(plant.workers().iter().all(|w| w.state() == WorkerState::Stopped));
    }

    #[test]
    fn immediate_stop_terminates_with_few_oranges() {
        let plant = run_for(PlantConfig::default(), Duration::ZERO);
        let stats = plant.stats();
        // At most a couple of fetch cycles fit into the stop sequence.
        assert!(stats.provided <= 3, "provided {}", stats.provided);
        assert!(stats.is_conserved());
    }

    #[test]
    fn drain_policy_leaves_no_waste() {
        let config = PlantConfig {
            shutdown: ShutdownPolicy::Drain,
            ..PlantConfig::default()
        };
        let plant = run_for(config, Duration::from_millis(300));
        let stats = plant.stats();

        assert!(stats.provided > 0);
        assert_eq!(stats.waste, 0);
        assert_eq!(stats.processed, stats.provided);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn waiting_poll_conserves_oranges() {
        let config = PlantConfig {
            poll: PollStrategy::Wait(Duration::from_millis(5)),
            ..PlantConfig::default()
        };
        let plant = run_for(config, Duration::from_millis(300));
        assert!(plant.stats().is_conserved());
    }

    #[test]
    fn configure_builds_roster_in_role_order() {
        let mut plant = Plant::new(3, PlantConfig::default()).expect("valid config");
        plant.configure().expect("configure");
        let roles: Vec<Role> = plant.workers().iter().map(Worker::role).collect();
        assert_eq!(roles.len(), 9);
        assert!(roles.windows(2).all(|pair| pair[0].output_queue() <= pair[1].output_queue()));
        assert_eq!(plant.workers()[2].name(), "plant-3/squeezer-0");
    }

    #[test]
    fn start_after_stop_is_rejected() {
        let mut plant = run_for(PlantConfig::default(), Duration::ZERO);
        let err = plant.start().expect_err("plants are single use");
        assert!(matches!(err, PlantError::InvalidTransition { .. }));
    }

    #[test]
    fn rejects_roster_missing_a_role() {
        let config = PlantConfig {
            roster: Roster {
                processors: 0,
                ..Roster::default()
            },
            ..PlantConfig::default()
        };
        assert!(matches!(
            Plant::new(0, config),
            Err(PlantError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stop_before_start_reports_nothing() {
        let mut plant = Plant::new(0, PlantConfig::default()).expect("valid config");
        plant.stop();
        assert_eq!(plant.stats(), PlantStats::default());
    }

    #[test]
    fn drain_finishes_when_a_stage_exits_early() {
        let config = PlantConfig {
            shutdown: ShutdownPolicy::Drain,
            ..PlantConfig::default()
        };
        let mut plant = Plant::new(0, config).expect("valid config");
        plant.start().expect("plant starts");
        // The only peeler rejects this orange and exits, so queue 0 never empties.
        plant.queues[0].push(Orange::in_state_for_test(999_999, State::Bottled));
        thread::sleep(Duration::from_millis(300));

        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            plant.stop();
            done_tx.send(plant.queue_sizes()).expect("send sizes");
        });
        let sizes = done_rx
            .recv_timeout(Duration::from_secs(8))
            .expect("drain stop never returned");
        handle.join().expect("stopping thread panicked");

        assert!(sizes[0] >= 1, "sizes {sizes:?}");
        // Stages downstream of the dead peeler still drained.
        assert_eq!(&sizes[1..STAGE_QUEUES - 1], &[0, 0, 0]);
    }

    #[test]
    fn panicked_worker_does_not_block_shutdown() {
        for policy in [ShutdownPolicy::Truncate, ShutdownPolicy::Drain] {
            let mut plant = Plant::new(0, PlantConfig::default()).expect("valid config");
            plant.configure().expect("configure");
            let mut workers = std::mem::take(&mut plant.workers);
            for (index, worker) in workers.iter_mut().enumerate() {
                // Index 1 is the only peeler.
                if index == 1 {
                    worker.start_panicking_for_test();
                } else {
                    worker.start().expect("worker starts");
                }
            }
            thread::sleep(Duration::from_millis(100));

            shut_down(plant.label(), policy, &plant.queues, &mut workers);
            assert!(
                workers.iter().all(|w| w.state() == WorkerState::Stopped),
                "{policy:?} left a worker running"
            );
        }
    }

    #[test]
    fn coordinating_thread_owns_workers_while_running() {
        let mut plant = Plant::new(0, PlantConfig::default()).expect("valid config");
        plant.start().expect("plant starts");
        assert!(plant.workers().is_empty());
        thread::sleep(Duration::from_millis(100));
        // Counters stay readable while the coordinating thread holds the workers.
        assert!(plant.provided_count() > 0);

        plant.request_stop();
        plant.stop();
        assert_eq!(plant.workers().len(), 9);
        assert!(plant.stats().is_conserved());
    }
}
