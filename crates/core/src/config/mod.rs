use serde::{Deserialize, Serialize};

use crate::{Calibrator, Console, Result, TimerError, TimerProfile};

/// Top-level configuration structure for the application.
///
/// The core only defines the shape; reading and writing it is left to the
/// embedding application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timer: TimerSettings,
    pub profile: TimerProfile,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.timer.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Settings shared by every timer variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub console: Console,
    /// Milliseconds between scheduler ticks.
    pub refresh_interval: u64,
    pub precision_calibration: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            console: Console::Gba,
            refresh_interval: 8,
            precision_calibration: false,
        }
    }
}

impl TimerSettings {
    pub fn validate(&self) -> Result<()> {
        self.console.validate()?;
        if self.refresh_interval == 0 {
            return Err(TimerError::InvalidRefreshInterval(self.refresh_interval));
        }
        Ok(())
    }

    pub fn calibrator(&self) -> Result<Calibrator> {
        Calibrator::new(self.console)
    }
}
