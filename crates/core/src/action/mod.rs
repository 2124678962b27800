use std::sync::mpsc::Sender;
use std::time::Instant;

/// Receiver of phase boundary notifications.
///
/// Implementations decide which sound or visual cue, if any, belongs to the
/// phase. They are called from inside the tick loop and must return promptly
/// without panicking.
pub trait Notifier {
    fn notify(&mut self, phase_index: usize);
}

impl<F> Notifier for F
where
    F: FnMut(usize),
{
    fn notify(&mut self, phase_index: usize) {
        self(phase_index)
    }
}

/// Message handed to the collaborator that performs the actual cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEvent {
    pub phase_index: usize,
    pub fired_at: Instant,
}

/// Fire-and-forget notifier that forwards events to another thread.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<ActionEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<ActionEvent>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&mut self, phase_index: usize) {
        let event = ActionEvent {
            phase_index,
            fired_at: Instant::now(),
        };
        // The channel is unbounded, so this never blocks the tick loop.
        if self.sender.send(event).is_err() {
            tracing::warn!(phase_index, "action receiver disconnected; dropping notification");
        }
    }
}
