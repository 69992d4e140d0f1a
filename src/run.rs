//! The run state machine: `Idle -> Running -> Stopping -> Idle`.
//!
//! [`LoadRunner`] owns at most one active run. `start` and `stop` serialize on a
//! single async mutex; `status` only takes the state read lock and never waits
//! on a start or stop in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::controller::RateController;
use crate::dispatcher::{Dispatcher, RunScope};
use crate::errors::StartError;
use crate::executor::RequestExecutor;
use crate::metrics::{RUNS_STARTED_TOTAL, TARGET_RPS};
use crate::state::{RunConfig, RunPhase, RunStatus, SharedState};

/// Lowest accepted `max_rps`.
pub const MIN_RPS: u32 = 1;

/// Highest accepted `max_rps`.
pub const MAX_RPS: u32 = 1000;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on waiting for in-flight requests when a run stops.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks a requested rate and narrows it to the engine's integer type.
pub fn validate_rps(rps: i64) -> Result<u32, StartError> {
    match u32::try_from(rps) {
        Ok(v) if (MIN_RPS..=MAX_RPS).contains(&v) => Ok(v),
        _ => Err(StartError::InvalidConfig { rps }),
    }
}

/// Timing knobs of the runner.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub request_timeout: Duration,
    pub drain_timeout: Duration,
    pub control_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            control_interval: crate::controller::CONTROL_INTERVAL,
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A run was active and has been stopped.
    Stopped,
    /// Nothing was running.
    AlreadyIdle,
}

struct ActiveRun {
    run_id: u64,
    token: CancellationToken,
    tracker: TaskTracker,
    dispatcher: JoinHandle<()>,
    controller: JoinHandle<()>,
}

/// Owns the load generation engine for one target.
pub struct LoadRunner {
    executor: Arc<RequestExecutor>,
    catalog: Arc<Catalog>,
    settings: RunnerSettings,
    state: Arc<SharedState>,
    active: Mutex<Option<ActiveRun>>,
    next_run_id: AtomicU64,
}

impl LoadRunner {
    pub fn new(executor: RequestExecutor, catalog: Catalog, settings: RunnerSettings) -> Self {
        Self {
            executor: Arc::new(executor),
            catalog: Arc::new(catalog),
            settings,
            state: Arc::new(SharedState::new()),
            active: Mutex::new(None),
            next_run_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Starts a new run, superseding any run that is already active.
    ///
    /// The rate is validated before the previous run is touched, so an invalid
    /// request leaves a running test alone. Returns the new run's id as soon as
    /// its loops are spawned; traffic begins on the first tick.
    pub async fn start(&self, config: RunConfig) -> Result<u64, StartError> {
        validate_rps(i64::from(config.max_rps))?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(run_id = previous.run_id, "Superseding active run");
            self.shutdown(previous).await;
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let initial_rps = config.profile.initial_rps(config.max_rps);
        let started = self.state.begin(run_id, &config, initial_rps);

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let scope = Arc::new(RunScope {
            run_id,
            token: token.clone(),
            state: self.state.clone(),
            executor: self.executor.clone(),
            endpoint: self.catalog.resolve_endpoint(&config.endpoint),
            request_timeout: self.settings.request_timeout,
            started,
        });

        let (dispatcher, handle) = Dispatcher::new(scope.clone(), tracker.clone(), initial_rps);
        let controller = RateController::new(scope, config.profile, config.max_rps, handle)
            .with_interval(self.settings.control_interval);

        *active = Some(ActiveRun {
            run_id,
            token,
            tracker,
            dispatcher: tokio::spawn(dispatcher.run()),
            controller: tokio::spawn(controller.run()),
        });

        RUNS_STARTED_TOTAL.inc();
        TARGET_RPS.set(i64::from(initial_rps));
        info!(
            run_id = run_id,
            target = %self.executor.base_url(),
            endpoint = %config.endpoint,
            max_rps = config.max_rps,
            profile = %config.profile,
            initial_rps = initial_rps,
            "Load test started"
        );

        Ok(run_id)
    }

    /// Stops the active run and waits for its in-flight requests to drain.
    pub async fn stop(&self) -> StopOutcome {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(run) => {
                self.shutdown(run).await;
                StopOutcome::Stopped
            }
            None => StopOutcome::AlreadyIdle,
        }
    }

    /// Stop used from process termination handling.
    pub async fn force_stop(&self) -> StopOutcome {
        info!("Force stop initiated");
        self.stop().await
    }

    pub fn status(&self) -> RunStatus {
        self.state.status()
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase()
    }

    async fn shutdown(&self, run: ActiveRun) {
        let ActiveRun {
            run_id,
            token,
            tracker,
            dispatcher,
            controller,
        } = run;

        self.state.begin_stopping(run_id);
        token.cancel();
        tracker.close();
        TARGET_RPS.set(0);

        let drain = async {
            // Loops first: once they exit nothing new enters the tracker
            let _ = dispatcher.await;
            let _ = controller.await;
            tracker.wait().await;
        };

        match time::timeout(self.settings.drain_timeout, drain).await {
            Ok(()) => info!(run_id = run_id, "All request tasks stopped gracefully"),
            Err(_) => warn!(
                run_id = run_id,
                in_flight = tracker.len(),
                drain_timeout_ms = self.settings.drain_timeout.as_millis() as u64,
                "Some request tasks did not stop within the drain timeout"
            ),
        }

        self.state.finish(run_id);
        let counters = self.state.status().counters;
        info!(
            run_id = run_id,
            total = counters.total,
            success = counters.success,
            error = counters.error,
            success_rate = counters.success_rate(),
            "Load test stopped"
        );
    }
}

impl Drop for LoadRunner {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().take() {
            self.state.begin_stopping(run.run_id);
            run.token.cancel();
            self.state.finish(run.run_id);
        }
    }
}
