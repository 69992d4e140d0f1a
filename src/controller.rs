use std::sync::Arc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::debug;

use crate::dispatcher::{DispatcherHandle, RunScope};
use crate::load_models::ProfileKind;
use crate::metrics::TARGET_RPS;

/// How often the controller re-evaluates the load profile.
pub const CONTROL_INTERVAL: Duration = Duration::from_secs(1);

/// Decides whether a freshly computed target should replace the current rate.
///
/// A target of 0 holds the previous rate so the dispatcher never receives a
/// zero period from the controller.
pub fn next_rate(current: u32, target: u32) -> Option<u32> {
    if target == 0 || target == current {
        None
    } else {
        Some(target)
    }
}

/// Periodically recomputes the target rate and retunes the dispatcher.
pub struct RateController {
    scope: Arc<RunScope>,
    profile: ProfileKind,
    max_rps: u32,
    dispatcher: DispatcherHandle,
    interval: Duration,
}

impl RateController {
    pub fn new(
        scope: Arc<RunScope>,
        profile: ProfileKind,
        max_rps: u32,
        dispatcher: DispatcherHandle,
    ) -> Self {
        Self {
            scope,
            profile,
            max_rps,
            dispatcher,
            interval: CONTROL_INTERVAL,
        }
    }

    /// Overrides the evaluation interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Applies one profile evaluation at `elapsed_secs`. Returns the new rate if it changed.
    pub fn adjust(&self, elapsed_secs: f64) -> Option<u32> {
        let target = self.profile.calculate_current_rps(elapsed_secs, self.max_rps);
        let current = self.dispatcher.rate();
        let new_rps = next_rate(current, target)?;

        if !self.scope.state.set_current_rps(self.scope.run_id, new_rps) {
            return None;
        }
        self.dispatcher.set_rate(new_rps);
        TARGET_RPS.set(i64::from(new_rps));

        debug!(
            run_id = self.scope.run_id,
            profile = %self.profile,
            elapsed_secs = elapsed_secs,
            from = current,
            to = new_rps,
            in_flight = self.dispatcher.in_flight(),
            "Target RPS changed"
        );
        Some(new_rps)
    }

    /// Runs until the run is cancelled or leaves `Running`.
    pub async fn run(self) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.scope.token.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.scope.is_active() {
                        break;
                    }
                    let elapsed = self.scope.started.elapsed().as_secs_f64();
                    self.adjust(elapsed);
                }
            }
        }

        debug!(run_id = self.scope.run_id, "Rate controller stopped");
    }
}
