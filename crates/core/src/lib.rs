//! Core library for the EonTimer application.
//!
//! The crate converts frame counts, seconds and milliseconds into wall-clock
//! waits using each console's measured framerate, keeps a per-phase
//! calibration that is refined from the operator's observed results, and
//! drives multi-phase timers from a fixed-interval tick loop. It decides
//! *when* a cue fires; what the cue looks or sounds like belongs to the
//! [`Notifier`] supplied by the embedding application.

pub mod action;
pub mod calibration;
pub mod config;
pub mod console;
pub mod error;
pub mod phase;
pub mod property;
pub mod timeline;
pub mod timer;
pub mod timers;

pub use action::{ActionEvent, ChannelNotifier, Notifier};
pub use calibration::Calibrator;
pub use config::{AppConfig, TimerSettings};
pub use console::Console;
pub use error::{Result, TimerError};
pub use phase::{Phase, PhaseRecord, Unit};
pub use property::{Property, Subscription};
pub use timeline::{CancelToken, Clock, ManualClock, Scheduler, SystemClock};
pub use timer::{to_minimum_length, Timer, TimerState, MINIMUM_LENGTH_MS};
pub use timers::{
    CustomTimer, DelayTimer, EnhancedEntralinkTimer, EntralinkTimer, FrameTimer, SecondTimer,
    TimerProfile,
};
