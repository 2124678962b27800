use crate::{Console, Result, Unit};

/// Converts phase quantities into wall-clock milliseconds for one console.
///
/// This is the only place where unit semantics are interpreted. Phases and
/// timers route every conversion through it instead of redoing frame math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibrator {
    console: Console,
    frame_duration_ms: f64,
}

impl Calibrator {
    /// Resolves a calibrator for `console`, rejecting unusable custom rates.
    pub fn new(console: Console) -> Result<Self> {
        console.validate()?;
        Ok(Self {
            console,
            frame_duration_ms: console.frame_duration_ms(),
        })
    }

    pub fn console(&self) -> Console {
        self.console
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.frame_duration_ms
    }

    pub fn to_milliseconds(&self, unit: Unit, value: f64) -> f64 {
        match unit {
            Unit::Milliseconds => value,
            Unit::Seconds => value * 1000.0,
            Unit::Frames | Unit::HexFrames => value * self.frame_duration_ms,
        }
    }

    /// Inverse of the frame conversion, used to present millisecond
    /// calibrations as a frame count.
    pub fn to_frames(&self, milliseconds: f64) -> f64 {
        milliseconds / self.frame_duration_ms
    }
}
