//! Thread-bound workers that fetch or advance oranges for a single stage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::config::PollStrategy;
use crate::error::{PlantError, Result};
use crate::orange::Orange;
use crate::stage_queue::StageQueue;
use crate::types::Role;

/// Lifecycle of a worker. Workers are not restartable once stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

/// Counters and the running flag shared between a worker and its thread.
///
/// Only the worker thread writes the counters. Readers see exact values once the
/// thread has been joined.
#[derive(Default)]
pub struct WorkerCounters {
    running: AtomicBool,
    fetched: AtomicU64,
    handled: AtomicU64,
}

impl WorkerCounters {
    pub fn fetched(&self) -> u64 {
        self.fetched.load(Ordering::SeqCst)
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }
}

/// One worker bound to one role and its input/output queues.
pub struct Worker {
    name: String,
    role: Role,
    input: Option<Arc<StageQueue>>,
    output: Arc<StageQueue>,
    orange_ids: Arc<AtomicU64>,
    poll: PollStrategy,
    shared: Arc<WorkerCounters>,
    state: WorkerState,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Build a fetcher that creates oranges and pushes them to `output`.
    ///
    /// `orange_ids` hands out ids unique across every fetcher of a plant.
    pub fn fetcher(
        name: impl Into<String>,
        output: Arc<StageQueue>,
        orange_ids: Arc<AtomicU64>,
    ) -> Self {
        Self::build(
            name.into(),
            Role::Fetcher,
            None,
            output,
            orange_ids,
            PollStrategy::Spin,
        )
    }

    /// Build a transform worker for `role` reading `input` and writing `output`.
    pub fn transform(
        name: impl Into<String>,
        role: Role,
        input: Arc<StageQueue>,
        output: Arc<StageQueue>,
        poll: PollStrategy,
    ) -> Result<Self> {
        if role == Role::Fetcher {
            return Err(PlantError::InvalidConfig(
                "a fetcher has no input queue".to_string(),
            ));
        }
        Ok(Self::build(
            name.into(),
            role,
            Some(input),
            output,
            Arc::new(AtomicU64::new(0)),
            poll,
        ))
    }

    fn build(
        name: String,
        role: Role,
        input: Option<Arc<StageQueue>>,
        output: Arc<StageQueue>,
        orange_ids: Arc<AtomicU64>,
        poll: PollStrategy,
    ) -> Self {
        Self {
            name,
            role,
            input,
            output,
            orange_ids,
            poll,
            shared: Arc::new(WorkerCounters::default()),
            state: WorkerState::Idle,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Oranges this worker created. Always zero for transform roles.
    pub fn oranges_fetched(&self) -> u64 {
        self.shared.fetched()
    }

    /// Oranges this worker finished its labour on and pushed downstream.
    pub fn oranges_handled(&self) -> u64 {
        self.shared.handled()
    }

    /// Handle on this worker's counters that stays valid wherever the worker moves.
    pub fn counters(&self) -> Arc<WorkerCounters> {
        Arc::clone(&self.shared)
    }

    /// Whether the worker thread has exited, either after `stop()` or on its own.
    pub fn is_finished(&self) -> bool {
        match self.state {
            WorkerState::Running => self.handle.as_ref().is_none_or(JoinHandle::is_finished),
            _ => true,
        }
    }

    /// Spawn the worker loop on its own named thread.
    pub fn start(&mut self) -> Result<()> {
        if self.state != WorkerState::Idle {
            return Err(PlantError::InvalidTransition {
                action: "start worker",
                state: self.state.as_str(),
            });
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let job = self.job();
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || job.run());
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = WorkerState::Running;
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(PlantError::Spawn(err))
            }
        }
    }

    /// Ask the loop to exit, then wait for the thread.
    ///
    /// A worker in the middle of its labour finishes that orange first, so this can
    /// block for up to one stage's work duration. Calling it again is a no-op.
    pub fn stop(&mut self) {
        match self.state {
            WorkerState::Idle => {
                warn!(worker = %self.name, "stop requested for a worker that never started");
                self.state = WorkerState::Stopped;
                return;
            }
            WorkerState::Stopping | WorkerState::Stopped => return,
            WorkerState::Running => {}
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.state = WorkerState::Stopping;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(worker = %self.name, "worker thread panicked before stop");
            }
        }
        self.state = WorkerState::Stopped;
    }

    /// Test-only start whose thread panics instead of running the loop.
    #[cfg(test)]
    pub(crate) fn start_panicking_for_test(&mut self) {
        self.shared.running.store(true, Ordering::SeqCst);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || panic!("{name} dropped an orange on the floor"))
            .expect("failed to spawn test worker");
        self.handle = Some(handle);
        self.state = WorkerState::Running;
    }

    fn job(&self) -> Job {
        Job {
            name: self.name.clone(),
            role: self.role,
            input: self.input.clone(),
            output: Arc::clone(&self.output),
            orange_ids: Arc::clone(&self.orange_ids),
            poll: self.poll,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.state == WorkerState::Running {
            self.stop();
        }
    }
}

/// Everything the worker thread owns while its loop runs.
struct Job {
    name: String,
    role: Role,
    input: Option<Arc<StageQueue>>,
    output: Arc<StageQueue>,
    orange_ids: Arc<AtomicU64>,
    poll: PollStrategy,
    shared: Arc<WorkerCounters>,
}

impl Job {
    fn run(self) {
        info!(worker = %self.name, role = %self.role, "worker started");
        match &self.input {
            None => self.fetch_loop(),
            Some(input) => self.transform_loop(input),
        }
        info!(
            worker = %self.name,
            handled = self.shared.handled(),
            "worker stopped"
        );
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn fetch_loop(&self) {
        while self.is_running() {
            let id = self.orange_ids.fetch_add(1, Ordering::SeqCst);
            let orange = Orange::fetch(id);
            self.shared.fetched.fetch_add(1, Ordering::SeqCst);
            self.shared.handled.fetch_add(1, Ordering::SeqCst);
            debug!(orange = id, "orange fetched");
            self.output.push(orange);
        }
    }

    fn transform_loop(&self, input: &StageQueue) {
        while self.is_running() {
            let next = match self.poll {
                PollStrategy::Spin => input.try_pop(),
                PollStrategy::Wait(timeout) => input.pop_timeout(timeout),
            };
            let Some(mut orange) = next else {
                if self.poll == PollStrategy::Spin {
                    std::hint::spin_loop();
                }
                continue;
            };

            if let Err(err) = self.process(&mut orange) {
                error!(worker = %self.name, error = %err, "contract violation, worker exiting");
                // Keep the orange accounted for as a resident of its input queue.
                input.push(orange);
                return;
            }
            self.shared.handled.fetch_add(1, Ordering::SeqCst);
            self.output.push(orange);
        }
    }

    fn process(&self, orange: &mut Orange) -> Result<()> {
        if let Some(expected) = self.role.input_state() {
            if orange.state() != expected {
                return Err(PlantError::WrongStage {
                    id: orange.id(),
                    expected,
                    found: orange.state(),
                });
            }
        }
        let state = orange.advance()?;
        if state.is_terminal() {
            debug!(orange = orange.id(), "orange processed");
        } else {
            debug!(orange = orange.id(), state = ?state, "orange advanced");
        }
        Ok(())
    }
}
