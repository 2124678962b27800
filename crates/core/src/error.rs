use crate::TimerState;

/// Result alias that carries the custom [`TimerError`] type.
pub type Result<T> = std::result::Result<T, TimerError>;

/// Common error type for the core crate.
///
/// Every variant is a local, synchronous configuration or integration error.
/// None of them are transient, so nothing in the crate retries on failure.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// A custom console was configured with a framerate that is not a
    /// positive, finite number.
    #[error("invalid framerate {0}: frames per second must be positive")]
    InvalidFramerate(f64),
    /// A persisted phase record carried a negative target or hit.
    #[error("invalid phase {field} {value}: must not be negative")]
    InvalidPhaseTarget { field: &'static str, value: i64 },
    /// A persisted phase record carried a calibration that is NaN or infinite.
    #[error("invalid calibration {0}: must be a finite number of milliseconds")]
    InvalidCalibration(f64),
    /// A control operation was issued in a state that does not accept it.
    #[error("cannot {operation} a timer that is {state}")]
    InvalidTimerState {
        operation: &'static str,
        state: TimerState,
    },
    /// The scheduler was configured to tick every 0 ms.
    #[error("invalid refresh interval {0}ms: must be at least 1ms")]
    InvalidRefreshInterval(u64),
    /// A hit was recorded against a zero-based phase index past the end of
    /// the sequence.
    #[error("phase {index} does not exist (timer has {len} phases)")]
    PhaseOutOfRange { index: usize, len: usize },
    /// A hit was recorded against a phase the profile derives from its other
    /// settings, so there is nowhere to persist the correction.
    #[error("phase {index} is derived from the profile settings and cannot take a hit")]
    PhaseNotCalibratable { index: usize },
    /// Free-form message, mostly surfaced by the command line collaborator.
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl TimerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn invalid_state(operation: &'static str, state: TimerState) -> Self {
        Self::InvalidTimerState { operation, state }
    }
}

impl From<&str> for TimerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TimerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
