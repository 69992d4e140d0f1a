//! Run state shared between the control path and the tasks of a run.
//!
//! All fields live behind one `RwLock`. The id of the live run is mirrored in an
//! atomic so the dispatch hot path can check liveness without locking.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::load_models::ProfileKind;
use crate::stats::{RequestOutcome, Stats, StatsSnapshot};

/// Sentinel stored in the liveness atomic when no run is `Running`.
const NO_RUN: u64 = 0;

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Stopping,
}

/// Immutable parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub endpoint: String,
    pub max_rps: u32,
    pub profile: ProfileKind,
}

impl RunConfig {
    pub fn new(endpoint: impl Into<String>, max_rps: u32, profile: ProfileKind) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_rps,
            profile,
        }
    }
}

/// Serializable snapshot returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub phase: RunPhase,
    pub running: bool,
    pub run_id: u64,
    pub current_rps: u32,
    #[serde(rename = "rps")]
    pub max_rps: u32,
    pub endpoint: Option<String>,
    pub profile: Option<ProfileKind>,
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Unix time in milliseconds at which the run started.
    pub started_at: Option<u64>,
    pub elapsed_secs: f64,
}

#[derive(Debug)]
struct RunState {
    phase: RunPhase,
    run_id: u64,
    config: Option<RunConfig>,
    current_rps: u32,
    started_at: Option<SystemTime>,
    started: Option<Instant>,
    stopped: Option<Instant>,
    stats: Arc<Stats>,
}

/// State of the current (or most recent) run.
#[derive(Debug)]
pub struct SharedState {
    inner: RwLock<RunState>,
    live_run: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RunState {
                phase: RunPhase::Idle,
                run_id: NO_RUN,
                config: None,
                current_rps: 0,
                started_at: None,
                started: None,
                stopped: None,
                stats: Arc::new(Stats::new()),
            }),
            live_run: AtomicU64::new(NO_RUN),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RunState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock-free check that `run_id` is the run currently in `Running`.
    pub fn is_live(&self, run_id: u64) -> bool {
        run_id != NO_RUN && self.live_run.load(Ordering::Acquire) == run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.read().phase
    }

    /// Replaces the state with a fresh `Running` run and zeroed counters.
    pub fn begin(&self, run_id: u64, config: &RunConfig, initial_rps: u32) -> Instant {
        let started = Instant::now();
        let mut state = self.write();
        *state = RunState {
            phase: RunPhase::Running,
            run_id,
            config: Some(config.clone()),
            current_rps: initial_rps,
            started_at: Some(SystemTime::now()),
            started: Some(started),
            stopped: None,
            stats: Arc::new(Stats::new()),
        };
        self.live_run.store(run_id, Ordering::Release);
        started
    }

    /// Moves `run_id` to `Stopping`. Returns false if it is not the current run.
    pub fn begin_stopping(&self, run_id: u64) -> bool {
        let _ = self.live_run.compare_exchange(
            run_id,
            NO_RUN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let mut state = self.write();
        if state.run_id != run_id || state.phase == RunPhase::Idle {
            return false;
        }
        state.phase = RunPhase::Stopping;
        state.current_rps = 0;
        state.stopped = Some(Instant::now());
        true
    }

    /// Completes the stop of `run_id`, freezing its counters.
    pub fn finish(&self, run_id: u64) {
        let mut state = self.write();
        if state.run_id == run_id {
            state.phase = RunPhase::Idle;
            state.current_rps = 0;
        }
    }

    /// Records a completed request if `run_id` is still the running run.
    ///
    /// Returns false when the result was discarded.
    pub fn record(&self, run_id: u64, outcome: RequestOutcome) -> bool {
        if !self.is_live(run_id) {
            return false;
        }
        // The read guard keeps a concurrent stop from slipping in between the
        // phase check and the counter update.
        let state = self.read();
        if state.phase != RunPhase::Running || state.run_id != run_id {
            return false;
        }
        state.stats.record(outcome);
        true
    }

    /// Publishes a new tick rate for `run_id`.
    pub fn set_current_rps(&self, run_id: u64, rps: u32) -> bool {
        let mut state = self.write();
        if state.phase != RunPhase::Running || state.run_id != run_id {
            return false;
        }
        state.current_rps = rps;
        true
    }

    pub fn status(&self) -> RunStatus {
        let state = self.read();
        let elapsed_secs = match (state.started, state.stopped) {
            (Some(started), Some(stopped)) => stopped.duration_since(started).as_secs_f64(),
            (Some(started), None) => started.elapsed().as_secs_f64(),
            _ => 0.0,
        };
        let started_at = state.started_at.and_then(|t| {
            t.duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis() as u64)
        });

        RunStatus {
            phase: state.phase,
            running: state.phase == RunPhase::Running,
            run_id: state.run_id,
            current_rps: state.current_rps,
            max_rps: state.config.as_ref().map_or(0, |c| c.max_rps),
            endpoint: state.config.as_ref().map(|c| c.endpoint.clone()),
            profile: state.config.as_ref().map(|c| c.profile),
            counters: state.stats.snapshot(),
            started_at,
            elapsed_secs,
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
