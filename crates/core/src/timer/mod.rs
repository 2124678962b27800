//! Run-time state machine shared by every timer variant.
//!
//! A [`Timer`] owns an ordered sequence of [`Phase`]s and walks through them
//! against a caller supplied clock:
//!
//! ```text
//! Idle --start--> Running <--pause/resume--> Paused
//!                    |
//!                    +--(last phase elapsed)--> Completed
//! any state --reset--> Idle
//! ```
//!
//! Variants only differ in how the phase sequence is built, see
//! [`crate::timers`].

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{Calibrator, Notifier, Phase, PhaseRecord, Result, TimerError};

/// Shortest total run that still leaves room for the minute aligned overlay.
pub const MINIMUM_LENGTH_MS: i64 = 14_000;
pub const MINUTE_MS: i64 = 60_000;

/// Pads `value_ms` with whole minutes until it reaches [`MINIMUM_LENGTH_MS`].
///
/// Values already long enough are returned unchanged. The padding is always a
/// whole number of minutes so the result keeps its position within a minute.
/// Any input is accepted: padded results always land below
/// `MINIMUM_LENGTH_MS + MINUTE_MS`.
pub fn to_minimum_length(value_ms: i64) -> i64 {
    if value_ms >= MINIMUM_LENGTH_MS {
        return value_ms;
    }
    // Widened so the shortfall of values near i64::MIN cannot overflow.
    let minute = i128::from(MINUTE_MS);
    let shortfall = i128::from(MINIMUM_LENGTH_MS) - i128::from(value_ms);
    let minutes = (shortfall + minute - 1) / minute;
    let padded = i128::from(value_ms) + minutes * minute;
    i64::try_from(padded).unwrap_or(MINIMUM_LENGTH_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimerState::Idle => "idle",
            TimerState::Running => "running",
            TimerState::Paused => "paused",
            TimerState::Completed => "completed",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone)]
pub struct Timer {
    calibrator: Calibrator,
    phases: Vec<Phase>,
    current_index: usize,
    elapsed_ms: f64,
    state: TimerState,
    anchor: Option<Instant>,
}

impl Timer {
    pub fn new(calibrator: Calibrator, phases: Vec<Phase>) -> Self {
        Self {
            calibrator,
            phases,
            current_index: 0,
            elapsed_ms: 0.0,
            state: TimerState::Idle,
            anchor: None,
        }
    }

    /// Rebuilds a timer from persisted phase records.
    pub fn from_records(calibrator: Calibrator, records: &[PhaseRecord]) -> Result<Self> {
        let phases = crate::phase::phases_from_records(records)?;
        Ok(Self::new(calibrator, phases))
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn records(&self) -> Vec<PhaseRecord> {
        self.phases.iter().map(PhaseRecord::from).collect()
    }

    /// Time accumulated inside the current phase, including carried overshoot.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos((self.elapsed_ms.max(0.0) * 1_000_000.0).round() as u64)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TimerState::Running | TimerState::Paused)
    }

    /// Effective duration of each phase, clamped at zero.
    pub fn durations_ms(&self) -> Vec<f64> {
        self.phases.iter().map(|phase| self.phase_duration_ms(phase)).collect()
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.durations_ms().iter().sum()
    }

    /// Time left in the current phase as of the last tick.
    pub fn remaining_ms(&self) -> Option<f64> {
        self.phases
            .get(self.current_index)
            .map(|phase| (self.phase_duration_ms(phase) - self.elapsed_ms).max(0.0))
    }

    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.is_active() {
            return Err(TimerError::invalid_state("start", self.state));
        }

        self.current_index = 0;
        self.elapsed_ms = 0.0;
        if self.phases.is_empty() {
            self.state = TimerState::Completed;
            self.anchor = None;
            tracing::info!("timer has no phases, completed on start");
            return Ok(());
        }

        self.state = TimerState::Running;
        self.anchor = Some(now);
        tracing::info!(
            phases = self.phases.len(),
            total_ms = self.total_duration_ms(),
            "timer started"
        );
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<()> {
        if self.state != TimerState::Running {
            return Err(TimerError::invalid_state("pause", self.state));
        }

        self.accumulate(now);
        self.anchor = None;
        self.state = TimerState::Paused;
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<()> {
        if self.state != TimerState::Paused {
            return Err(TimerError::invalid_state("resume", self.state));
        }

        self.anchor = Some(now);
        self.state = TimerState::Running;
        Ok(())
    }

    /// Advances the timer to `now`, notifying once per completed phase.
    ///
    /// Overshoot past a boundary is carried into the next phase, so a single
    /// tick may complete several short phases. Returns how many completed.
    pub fn tick(&mut self, now: Instant, notifier: &mut dyn Notifier) -> Result<usize> {
        if self.state != TimerState::Running {
            return Err(TimerError::invalid_state("tick", self.state));
        }

        self.accumulate(now);
        tracing::trace!(
            phase = self.current_index,
            elapsed_ms = self.elapsed_ms,
            "tick"
        );

        let mut completed = 0;
        while let Some(phase) = self.phases.get(self.current_index) {
            let duration = self.phase_duration_ms(phase);
            if self.elapsed_ms < duration {
                break;
            }

            self.elapsed_ms -= duration;
            tracing::debug!(
                phase = self.current_index,
                overshoot_ms = self.elapsed_ms,
                "phase completed"
            );
            notifier.notify(self.current_index);
            self.current_index += 1;
            completed += 1;
        }

        if self.current_index == self.phases.len() {
            self.state = TimerState::Completed;
            self.anchor = None;
            tracing::info!("timer completed");
        }

        Ok(completed)
    }

    /// Discards all run progress without notifying. Always succeeds.
    pub fn reset(&mut self) {
        self.state = TimerState::Idle;
        self.current_index = 0;
        self.elapsed_ms = 0.0;
        self.anchor = None;
    }

    /// Records an observed hit for one phase between runs.
    pub fn set_hit(&mut self, index: usize, hit: u64) -> Result<()> {
        if self.is_active() {
            return Err(TimerError::invalid_state("set a hit on", self.state));
        }

        let len = self.phases.len();
        let phase = self
            .phases
            .get_mut(index)
            .ok_or(TimerError::PhaseOutOfRange { index, len })?;
        phase.set_hit(hit);
        Ok(())
    }

    /// Calibrates every phase, returning the millisecond delta applied to each.
    pub fn calibrate(&mut self) -> Result<Vec<f64>> {
        if self.is_active() {
            return Err(TimerError::invalid_state("calibrate", self.state));
        }

        let calibrator = self.calibrator;
        Ok(self
            .phases
            .iter_mut()
            .map(|phase| phase.calibrate(&calibrator))
            .collect())
    }

    fn phase_duration_ms(&self, phase: &Phase) -> f64 {
        phase.effective_duration_ms(&self.calibrator).max(0.0)
    }

    fn accumulate(&mut self, now: Instant) {
        if let Some(anchor) = self.anchor {
            let delta = now.saturating_duration_since(anchor);
            self.elapsed_ms += delta.as_nanos() as f64 / 1_000_000.0;
        }
        self.anchor = Some(now);
    }
}
