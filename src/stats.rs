//! Per-run request counters.
//!
//! `total`, `success` and `error` move together under one lock so that every
//! snapshot satisfies `total == success + error`.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    #[serde(rename = "total_requests")]
    pub total: u64,
    #[serde(rename = "success_requests")]
    pub success: u64,
    #[serde(rename = "error_requests")]
    pub error: u64,
}

impl StatsSnapshot {
    /// Share of successful requests in percent, 0 when nothing was sent.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64 * 100.0
        }
    }
}

/// Concurrency-safe counter set for one run.
#[derive(Debug, Default)]
pub struct Stats {
    counters: Mutex<StatsSnapshot>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed request.
    pub fn record(&self, outcome: RequestOutcome) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.total += 1;
        match outcome {
            RequestOutcome::Success => counters.success += 1,
            RequestOutcome::Failure => counters.error += 1,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_zero() {
        let stats = Stats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.snapshot().success_rate(), 0.0);
    }

    #[test]
    fn records_outcomes() {
        let stats = Stats::new();
        stats.record(RequestOutcome::Success);
        stats.record(RequestOutcome::Success);
        stats.record(RequestOutcome::Failure);

        let snap = stats.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.success, 2);
        assert_eq!(snap.error, 1);
    }

    #[test]
    fn concurrent_records_keep_total_consistent() {
        let stats = Arc::new(Stats::new());
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for n in 0..5_000 {
                        let outcome = if (n + i) % 3 == 0 {
                            RequestOutcome::Failure
                        } else {
                            RequestOutcome::Success
                        };
                        stats.record(outcome);
                    }
                })
            })
            .collect();

        // Observers never see total run ahead of success + error
        let observer = {
            let stats = stats.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let snap = stats.snapshot();
                    assert_eq!(snap.total, snap.success + snap.error);
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        observer.join().unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.total, 40_000);
        assert_eq!(snap.total, snap.success + snap.error);
    }

    #[test]
    fn serializes_with_request_field_names() {
        let stats = Stats::new();
        stats.record(RequestOutcome::Failure);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["error_requests"], 1);
        assert_eq!(json["success_requests"], 0);
    }
}
