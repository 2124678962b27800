use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, TimerError};

/// Measured (not nominal) refresh rates of the supported hardware.
pub const GBA_FPS: f64 = 59.7275;
pub const NDS_SLOT1_FPS: f64 = 59.8261;
pub const NDS_SLOT2_FPS: f64 = 59.6555;

/// Hardware whose frame timing the engine compensates for.
///
/// DSi and 3DS run DS software in a backwards compatible mode and therefore
/// share the slot 1 rate. `Custom` carries an operator supplied rate, which
/// must be validated with [`Console::validate`] before it is used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Console {
    Gba,
    NdsSlot1,
    NdsSlot2,
    Dsi,
    ThreeDs,
    Custom(f64),
}

impl Default for Console {
    fn default() -> Self {
        Self::Gba
    }
}

impl Console {
    /// Frames per second of the console.
    pub fn fps(&self) -> f64 {
        match *self {
            Console::Gba => GBA_FPS,
            Console::NdsSlot2 => NDS_SLOT2_FPS,
            Console::NdsSlot1 | Console::Dsi | Console::ThreeDs => NDS_SLOT1_FPS,
            Console::Custom(fps) => fps,
        }
    }

    /// Duration of a single frame in milliseconds.
    pub fn frame_duration_ms(&self) -> f64 {
        1000.0 / self.fps()
    }

    /// Rejects custom framerates that cannot produce a usable frame duration.
    pub fn validate(&self) -> Result<()> {
        let fps = self.fps();
        if fps.is_finite() && fps > 0.0 {
            Ok(())
        } else {
            Err(TimerError::InvalidFramerate(fps))
        }
    }
}

impl fmt::Display for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Console::Gba => f.write_str("GBA"),
            Console::NdsSlot1 => f.write_str("NDS - Slot 1"),
            Console::NdsSlot2 => f.write_str("NDS - Slot 2"),
            Console::Dsi => f.write_str("DSI"),
            Console::ThreeDs => f.write_str("3DS"),
            Console::Custom(fps) => write!(f, "Custom ({fps} fps)"),
        }
    }
}
