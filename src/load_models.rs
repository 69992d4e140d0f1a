use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Width of the `ramp_up` window in seconds.
pub const RAMP_UP_WINDOW_SECS: f64 = 60.0;

/// How long `spike` holds at 1 RPS before jumping to the maximum.
pub const SPIKE_WARMUP_SECS: f64 = 5.0;

/// Period of one full `wave` oscillation in seconds.
pub const WAVE_PERIOD_SECS: f64 = 60.0;

/// Length of one `step` stair in seconds.
pub const STEP_INTERVAL_SECS: f64 = 30.0;

/// Chance that a single `stress` evaluation jumps straight to the maximum.
pub const STRESS_SPIKE_PROBABILITY: f64 = 0.1;

/// Represents the load profiles a run can follow.
///
/// Each profile maps elapsed time since the run started to a target
/// requests-per-second value bounded by the run's configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// Steady `max_rps` for the whole run.
    Constant,

    /// Linear climb from 1 to `max_rps` over the first 60 seconds.
    RampUp,

    /// 1 RPS for 5 seconds, then `max_rps`.
    Spike,

    /// Sine wave around `max_rps / 2` with a 60 second period.
    Wave,

    /// Staircase growing by `max(1, max_rps / 5)` every 30 seconds.
    Step,

    /// Random load between `max_rps / 3` and `max_rps` with occasional full bursts.
    Stress,
}

impl ProfileKind {
    /// All profiles in catalogue order.
    pub fn all() -> [ProfileKind; 6] {
        [
            ProfileKind::Constant,
            ProfileKind::RampUp,
            ProfileKind::Spike,
            ProfileKind::Wave,
            ProfileKind::Step,
            ProfileKind::Stress,
        ]
    }

    /// Wire name used by the control surface and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Constant => "constant",
            ProfileKind::RampUp => "ramp_up",
            ProfileKind::Spike => "spike",
            ProfileKind::Wave => "wave",
            ProfileKind::Step => "step",
            ProfileKind::Stress => "stress",
        }
    }

    /// Resolves a profile by wire name. Unknown names fall back to `Constant`.
    pub fn from_name(name: &str) -> ProfileKind {
        match name.trim() {
            "constant" => ProfileKind::Constant,
            "ramp_up" => ProfileKind::RampUp,
            "spike" => ProfileKind::Spike,
            "wave" => ProfileKind::Wave,
            "step" => ProfileKind::Step,
            "stress" => ProfileKind::Stress,
            other => {
                warn!(profile = %other, "Unknown load profile, using constant");
                ProfileKind::Constant
            }
        }
    }

    /// Rate a run starts at before the first controller adjustment.
    ///
    /// `constant` and `spike` start at full rate; the other profiles start at 1.
    pub fn initial_rps(&self, max_rps: u32) -> u32 {
        match self {
            ProfileKind::Constant | ProfileKind::Spike => max_rps,
            _ => 1.min(max_rps),
        }
    }

    /// Calculates the target RPS at `elapsed_secs` into the run.
    ///
    /// # Arguments
    /// * `elapsed_secs` - Seconds since the run started (negative values count as 0)
    /// * `max_rps` - The run's configured maximum rate
    ///
    /// # Returns
    /// A value in `[0, max_rps]`. Only `wave` can legitimately return 0.
    pub fn calculate_current_rps(&self, elapsed_secs: f64, max_rps: u32) -> u32 {
        self.calculate_current_rps_with_rng(elapsed_secs, max_rps, &mut rand::thread_rng())
    }

    /// Same as [`calculate_current_rps`](Self::calculate_current_rps) with a caller-supplied
    /// random source for `stress`.
    pub fn calculate_current_rps_with_rng<R: Rng + ?Sized>(
        &self,
        elapsed_secs: f64,
        max_rps: u32,
        rng: &mut R,
    ) -> u32 {
        let elapsed = if elapsed_secs.is_finite() {
            elapsed_secs.max(0.0)
        } else {
            0.0
        };

        match self {
            ProfileKind::Constant => max_rps,
            ProfileKind::RampUp => Self::calculate_ramp_up_rps(elapsed, max_rps),
            ProfileKind::Spike => {
                if elapsed < SPIKE_WARMUP_SECS {
                    1.min(max_rps)
                } else {
                    max_rps
                }
            }
            ProfileKind::Wave => Self::calculate_wave_rps(elapsed, max_rps),
            ProfileKind::Step => Self::calculate_step_rps(elapsed, max_rps),
            ProfileKind::Stress => Self::calculate_stress_rps(max_rps, rng),
        }
    }

    fn calculate_ramp_up_rps(elapsed: f64, max_rps: u32) -> u32 {
        if elapsed >= RAMP_UP_WINDOW_SECS || max_rps <= 1 {
            return max_rps;
        }
        let progress = elapsed / RAMP_UP_WINDOW_SECS;
        let rps = 1.0 + f64::from(max_rps - 1) * progress;
        (rps as u32).min(max_rps)
    }

    fn calculate_wave_rps(elapsed: f64, max_rps: u32) -> u32 {
        let amplitude = f64::from(max_rps) / 2.0;
        let phase = 2.0 * std::f64::consts::PI * elapsed / WAVE_PERIOD_SECS;
        let rps = amplitude + amplitude * phase.sin();
        // clamp absorbs floating point error around the trough
        (rps.clamp(0.0, f64::from(max_rps))) as u32
    }

    fn calculate_step_rps(elapsed: f64, max_rps: u32) -> u32 {
        let step = (elapsed / STEP_INTERVAL_SECS) as u32;
        let step_size = (max_rps / 5).max(1);
        step.saturating_add(1).saturating_mul(step_size).min(max_rps)
    }

    fn calculate_stress_rps<R: Rng + ?Sized>(max_rps: u32, rng: &mut R) -> u32 {
        if rng.gen_bool(STRESS_SPIKE_PROBABILITY) {
            return max_rps;
        }
        let base = max_rps / 3;
        let spread = max_rps / 2;
        let jitter = if spread > 0 { rng.gen_range(0..spread) } else { 0 };
        (base + jitter).min(max_rps)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
