use std::io::Write;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use clap::ValueEnum;
use eontimer_core::{ActionEvent, ChannelNotifier};

/// Which cues are produced when a phase completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionMode {
    /// Terminal bell and a flash line.
    Av,
    Audio,
    Visual,
    None,
}

impl ActionMode {
    fn audio(self) -> bool {
        matches!(self, ActionMode::Av | ActionMode::Audio)
    }

    fn visual(self) -> bool {
        matches!(self, ActionMode::Av | ActionMode::Visual)
    }
}

/// Spawns the thread that turns notifications into cues, returning the
/// notifier to hand to the scheduler.
pub fn spawn(mode: ActionMode, phase_count: usize) -> (ChannelNotifier, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel();
    let handle = thread::spawn(move || perform(receiver, mode, phase_count));
    (ChannelNotifier::new(sender), handle)
}

fn perform(receiver: Receiver<ActionEvent>, mode: ActionMode, phase_count: usize) {
    let started = Instant::now();
    for event in receiver {
        tracing::debug!(
            phase = event.phase_index,
            lag_us = event.fired_at.elapsed().as_micros() as u64,
            "performing action"
        );

        let mut stdout = std::io::stdout().lock();
        if mode.audio() {
            let _ = stdout.write_all(b"\x07");
        }
        if mode.visual() {
            let _ = writeln!(
                stdout,
                ">>>>>>>> phase {}/{} <<<<<<<< ({:.3}s)",
                event.phase_index + 1,
                phase_count,
                event.fired_at.duration_since(started).as_secs_f64()
            );
        }
        let _ = stdout.flush();
    }
}
