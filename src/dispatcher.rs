//! Tick loop that turns the current target rate into dispatched requests.
//!
//! The dispatcher fires every `1s / rps` and spawns one request task per tick
//! into the run's [`TaskTracker`]. The rate lives in a `watch` channel owned by
//! the [`DispatcherHandle`]; the loop swaps its interval when the value changes,
//! so every tick is driven by exactly one period. A rate of 0 pauses ticking.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::catalog::EndpointConfig;
use crate::errors::{ErrorCategory, RequestError};
use crate::executor::RequestExecutor;
use crate::metrics::{
    status_code_label, CONCURRENT_REQUESTS, REQUEST_ERRORS_BY_CATEGORY, REQUEST_STATUS_CODES,
    REQUEST_TOTAL,
};
use crate::state::SharedState;
use crate::stats::RequestOutcome;

/// Everything a task of one run needs, shared by the dispatcher, the
/// controller, and every request task.
#[derive(Debug)]
pub struct RunScope {
    pub run_id: u64,
    pub token: CancellationToken,
    pub state: Arc<SharedState>,
    pub executor: Arc<RequestExecutor>,
    pub endpoint: EndpointConfig,
    pub request_timeout: Duration,
    pub started: Instant,
}

impl RunScope {
    /// True while the run has not been cancelled and is still `Running`.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.state.is_live(self.run_id)
    }

    /// Runs one request to completion and records its outcome.
    ///
    /// Returns the recorded outcome, or `None` if the run stopped before the
    /// request started or before it finished.
    pub async fn execute_once(&self) -> Option<RequestOutcome> {
        if !self.is_active() {
            return None;
        }

        CONCURRENT_REQUESTS.inc();
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RequestError::Cancelled),
            res = time::timeout(self.request_timeout, self.executor.execute(&self.endpoint)) => {
                res.unwrap_or(Err(RequestError::Timeout))
            }
        };
        CONCURRENT_REQUESTS.dec();

        if matches!(result, Err(RequestError::Cancelled)) || !self.is_active() {
            return None;
        }

        let outcome = match &result {
            Ok(_) => RequestOutcome::Success,
            Err(_) => RequestOutcome::Failure,
        };
        if !self.state.record(self.run_id, outcome) {
            return None;
        }

        REQUEST_TOTAL.inc();
        match result {
            Ok(status) => {
                REQUEST_STATUS_CODES
                    .with_label_values(&[status_code_label(status)])
                    .inc();
            }
            Err(e) => {
                let status_label = match &e {
                    RequestError::Status(code) => status_code_label(*code),
                    _ => "error",
                };
                REQUEST_STATUS_CODES.with_label_values(&[status_label]).inc();

                let category = ErrorCategory::from_request_error(&e);
                REQUEST_ERRORS_BY_CATEGORY
                    .with_label_values(&[category.label()])
                    .inc();

                debug!(
                    run_id = self.run_id,
                    path = %self.endpoint.path,
                    error = %e,
                    category = %category,
                    "Request failed"
                );
            }
        }

        Some(outcome)
    }
}

/// Period between ticks for a rate, `None` meaning paused.
pub fn tick_period(rps: u32) -> Option<Duration> {
    if rps == 0 {
        None
    } else {
        Some(Duration::from_secs(1) / rps)
    }
}

fn make_ticker(rps: u32) -> Option<Interval> {
    tick_period(rps).map(|period| {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    })
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Control side of a dispatcher: retunes its rate and exposes in-flight work.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    rate_tx: Arc<watch::Sender<u32>>,
    tracker: TaskTracker,
}

impl DispatcherHandle {
    /// Changes the tick rate. Returns true if the rate actually changed.
    pub fn set_rate(&self, rps: u32) -> bool {
        self.rate_tx.send_if_modified(|current| {
            if *current == rps {
                false
            } else {
                *current = rps;
                true
            }
        })
    }

    pub fn rate(&self) -> u32 {
        *self.rate_tx.borrow()
    }

    /// Number of request tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

/// The ticking loop of one run.
pub struct Dispatcher {
    scope: Arc<RunScope>,
    tracker: TaskTracker,
    rate_rx: watch::Receiver<u32>,
}

impl Dispatcher {
    pub fn new(
        scope: Arc<RunScope>,
        tracker: TaskTracker,
        initial_rps: u32,
    ) -> (Self, DispatcherHandle) {
        let (rate_tx, rate_rx) = watch::channel(initial_rps);
        let handle = DispatcherHandle {
            rate_tx: Arc::new(rate_tx),
            tracker: tracker.clone(),
        };
        let dispatcher = Self {
            scope,
            tracker,
            rate_rx,
        };
        (dispatcher, handle)
    }

    /// Ticks until the run is cancelled or leaves `Running`.
    pub async fn run(mut self) {
        let initial = *self.rate_rx.borrow_and_update();
        let mut ticker = make_ticker(initial);
        let mut rate_open = true;
        let mut dispatched: u64 = 0;

        debug!(run_id = self.scope.run_id, rps = initial, "Dispatcher starting");

        loop {
            tokio::select! {
                biased;
                _ = self.scope.token.cancelled() => break,
                changed = self.rate_rx.changed(), if rate_open => {
                    if changed.is_err() {
                        rate_open = false;
                        continue;
                    }
                    let rps = *self.rate_rx.borrow_and_update();
                    ticker = make_ticker(rps);
                    debug!(
                        run_id = self.scope.run_id,
                        rps = rps,
                        paused = ticker.is_none(),
                        "Dispatcher retuned"
                    );
                }
                _ = next_tick(&mut ticker) => {
                    if !self.scope.is_active() {
                        break;
                    }
                    let scope = self.scope.clone();
                    self.tracker.spawn(async move {
                        scope.execute_once().await;
                    });
                    dispatched += 1;
                }
            }
        }

        info!(
            run_id = self.scope.run_id,
            dispatched = dispatched,
            in_flight = self.tracker.len(),
            "Dispatcher stopped"
        );
    }
}
