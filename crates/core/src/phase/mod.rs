use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Calibrator, Result, TimerError};

/// Unit a phase target and hit are expressed in.
///
/// `HexFrames` is arithmetically identical to `Frames`; the base only matters
/// when a value is displayed or entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Frames,
    HexFrames,
    Milliseconds,
    Seconds,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::Frames => "frames",
            Unit::HexFrames => "hex frames",
            Unit::Milliseconds => "ms",
            Unit::Seconds => "s",
        };
        f.pad(label)
    }
}

/// A single timed segment of a run.
///
/// `calibration` is an accumulated millisecond correction that is refined run
/// over run. `hit` is the value the operator observed on the last run and is
/// consumed by [`Phase::calibrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    unit: Unit,
    target: u64,
    hit: u64,
    calibration: f64,
}

impl Phase {
    pub fn new(unit: Unit, target: u64) -> Self {
        Self {
            unit,
            target,
            hit: 0,
            calibration: 0.0,
        }
    }

    /// Restores a previously accumulated correction.
    pub fn with_calibration(mut self, calibration: f64) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_hit(mut self, hit: u64) -> Self {
        self.hit = hit;
        self
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn hit(&self) -> u64 {
        self.hit
    }

    pub fn calibration(&self) -> f64 {
        self.calibration
    }

    /// Records the value observed on the last run.
    pub fn set_hit(&mut self, hit: u64) {
        self.hit = hit;
    }

    /// Milliseconds the scheduler waits for this phase.
    pub fn effective_duration_ms(&self, calibrator: &Calibrator) -> f64 {
        calibrator.to_milliseconds(self.unit, self.target as f64) + self.calibration
    }

    /// Folds the observed hit into the accumulated calibration and clears it.
    ///
    /// Returns the millisecond delta that was applied. A hit of zero means no
    /// observation was made and leaves the phase untouched. A hit later than
    /// the target yields a negative delta, pulling the next run earlier.
    pub fn calibrate(&mut self, calibrator: &Calibrator) -> f64 {
        if self.hit == 0 {
            return 0.0;
        }

        let raw_delta = self.target as f64 - self.hit as f64;
        let delta_ms = match self.unit {
            Unit::Milliseconds => raw_delta,
            unit => calibrator.to_milliseconds(unit, raw_delta),
        };

        tracing::debug!(
            unit = %self.unit,
            target = self.target,
            hit = self.hit,
            delta_ms,
            "calibrating phase"
        );

        self.calibration += delta_ms;
        self.hit = 0;
        delta_ms
    }
}

/// Persisted shape of a phase as round-tripped by the settings layer.
///
/// Targets and hits are signed here so that bad external input can be
/// reported instead of failing deep inside deserialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(default)]
    pub unit: Unit,
    pub target: i64,
    #[serde(default)]
    pub calibration: f64,
    #[serde(default)]
    pub hit: i64,
}

impl PhaseRecord {
    pub fn new(unit: Unit, target: i64) -> Self {
        Self {
            unit,
            target,
            calibration: 0.0,
            hit: 0,
        }
    }
}

impl TryFrom<&PhaseRecord> for Phase {
    type Error = TimerError;

    fn try_from(record: &PhaseRecord) -> Result<Self> {
        let target = u64::try_from(record.target).map_err(|_| TimerError::InvalidPhaseTarget {
            field: "target",
            value: record.target,
        })?;
        let hit = u64::try_from(record.hit).map_err(|_| TimerError::InvalidPhaseTarget {
            field: "hit",
            value: record.hit,
        })?;
        if !record.calibration.is_finite() {
            return Err(TimerError::InvalidCalibration(record.calibration));
        }

        Ok(Phase::new(record.unit, target)
            .with_calibration(record.calibration)
            .with_hit(hit))
    }
}

impl From<&Phase> for PhaseRecord {
    fn from(phase: &Phase) -> Self {
        Self {
            unit: phase.unit,
            target: i64::try_from(phase.target).unwrap_or(i64::MAX),
            calibration: phase.calibration,
            hit: i64::try_from(phase.hit).unwrap_or(i64::MAX),
        }
    }
}

/// Validates an ordered list of records into phases, preserving order.
pub fn phases_from_records(records: &[PhaseRecord]) -> Result<Vec<Phase>> {
    records.iter().map(Phase::try_from).collect()
}
