use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{Notifier, Property, Result, Timer, TimerError, TimerState};

/// Source of monotonic time for the tick loop.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Blocks until `deadline`. Returns immediately if it already passed.
    fn sleep_until(&self, deadline: Instant);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Deterministic clock that only moves when told to; sleeping jumps straight
/// to the deadline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep_until(&self, deadline: Instant) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

/// Shared flag used to abandon a running loop from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a [`Timer`] at a fixed refresh interval.
#[derive(Debug)]
pub struct Scheduler {
    refresh_interval: Duration,
    state: Property<TimerState>,
}

impl Scheduler {
    pub fn new(refresh_interval: Duration) -> Result<Self> {
        if refresh_interval.is_zero() {
            return Err(TimerError::InvalidRefreshInterval(0));
        }
        Ok(Self {
            refresh_interval,
            state: Property::new(TimerState::Idle),
        })
    }

    pub fn from_millis(refresh_interval_ms: u64) -> Result<Self> {
        if refresh_interval_ms == 0 {
            return Err(TimerError::InvalidRefreshInterval(refresh_interval_ms));
        }
        Self::new(Duration::from_millis(refresh_interval_ms))
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Observable state of the timer currently being driven.
    pub fn state(&self) -> &Property<TimerState> {
        &self.state
    }

    /// Performs one tick and publishes any state change.
    pub fn step(
        &mut self,
        timer: &mut Timer,
        notifier: &mut dyn Notifier,
        now: Instant,
    ) -> Result<usize> {
        let completed = timer.tick(now, notifier)?;
        self.publish(timer.state());
        Ok(completed)
    }

    /// Starts `timer` and ticks it until it completes or `cancel` is set.
    ///
    /// Deadlines are computed from the start instant rather than from the
    /// previous wake-up, so oversleeping on one tick does not shift the next.
    /// Cancellation resets the timer without notifying.
    pub fn run(
        &mut self,
        timer: &mut Timer,
        notifier: &mut dyn Notifier,
        clock: &dyn Clock,
        cancel: &CancelToken,
    ) -> Result<TimerState> {
        let start = clock.now();
        timer.start(start)?;
        self.publish(timer.state());
        tracing::info!(
            refresh_ms = self.refresh_interval.as_millis() as u64,
            "scheduler running"
        );

        let mut ticks: u32 = 0;
        while timer.state() == TimerState::Running {
            if cancel.is_cancelled() {
                timer.reset();
                self.publish(timer.state());
                tracing::info!("run cancelled");
                return Ok(TimerState::Idle);
            }

            ticks = ticks.saturating_add(1);
            clock.sleep_until(start + self.refresh_interval * ticks);
            self.step(timer, notifier, clock.now())?;
        }

        Ok(timer.state())
    }

    fn publish(&mut self, state: TimerState) {
        if self.state.get() != state {
            self.state.set(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{Calibrator, Console, Phase, Unit};

    fn timer(console: Console, phases: Vec<Phase>) -> Timer {
        Timer::new(Calibrator::new(console).unwrap(), phases)
    }

    #[test]
    fn manual_clock_sleeps_to_deadline() {
        let start = Instant::now();
        let clock = ManualClock::starting_at(start);
        clock.sleep_until(start + Duration::from_millis(8));
        clock.sleep_until(start + Duration::from_millis(4));
        assert_eq!(clock.now(), start + Duration::from_millis(8));
    }

    #[test]
    fn rejects_zero_refresh_interval() {
        assert!(matches!(
            Scheduler::from_millis(0),
            Err(TimerError::InvalidRefreshInterval(0))
        ));
    }

    #[test]
    fn runs_phases_to_completion() {
        let clock = ManualClock::new();
        let start = clock.now();
        let mut scheduler = Scheduler::from_millis(1).unwrap();
        let mut timer = timer(
            Console::Gba,
            vec![
                Phase::new(Unit::Milliseconds, 250),
                Phase::new(Unit::Seconds, 1),
            ],
        );
        let mut fired = Vec::new();

        let state = scheduler
            .run(
                &mut timer,
                &mut |index: usize| fired.push((index, clock.now() - start)),
                &clock,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(state, TimerState::Completed);
        assert_eq!(
            fired,
            vec![
                (0, Duration::from_millis(250)),
                (1, Duration::from_millis(1_250)),
            ]
        );
    }

    #[test]
    fn empty_sequence_completes_without_sleeping() {
        let clock = ManualClock::new();
        let start = clock.now();
        let mut scheduler = Scheduler::from_millis(8).unwrap();
        let mut timer = timer(Console::Gba, Vec::new());
        let mut fired = 0;

        let state = scheduler
            .run(&mut timer, &mut |_: usize| fired += 1, &clock, &CancelToken::new())
            .unwrap();

        assert_eq!(state, TimerState::Completed);
        assert_eq!(scheduler.state().get(), TimerState::Completed);
        assert_eq!(clock.now(), start);
        assert_eq!(fired, 0);
    }

    #[test]
    fn coarse_refresh_fires_on_first_tick_past_boundary() {
        let clock = ManualClock::new();
        let start = clock.now();
        let mut scheduler = Scheduler::from_millis(8).unwrap();
        let mut timer = timer(Console::NdsSlot1, vec![Phase::new(Unit::Frames, 60)]);
        let mut fired_at = None;

        scheduler
            .run(
                &mut timer,
                &mut |_: usize| fired_at = Some(clock.now() - start),
                &clock,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(fired_at, Some(Duration::from_millis(1_008)));
    }

    #[test]
    fn publishes_state_transitions() {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::from_millis(10).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = scheduler
            .state()
            .subscribe(move |old: &TimerState, new: &TimerState| {
                sink.borrow_mut().push((*old, *new))
            });
        let mut timer = timer(Console::Gba, vec![Phase::new(Unit::Milliseconds, 30)]);

        scheduler
            .run(&mut timer, &mut |_: usize| {}, &clock, &CancelToken::new())
            .unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (TimerState::Idle, TimerState::Running),
                (TimerState::Running, TimerState::Completed),
            ]
        );
    }

    #[test]
    fn cancellation_resets_without_notifying() {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::from_millis(8).unwrap();
        let mut timer = timer(Console::Gba, vec![Phase::new(Unit::Seconds, 60)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut fired = 0;

        let state = scheduler
            .run(&mut timer, &mut |_: usize| fired += 1, &clock, &cancel)
            .unwrap();

        assert_eq!(state, TimerState::Idle);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(fired, 0);
        assert_eq!(scheduler.state().get(), TimerState::Idle);
    }

    #[test]
    fn refuses_to_run_an_active_timer() {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::from_millis(8).unwrap();
        let mut timer = timer(Console::Gba, vec![Phase::new(Unit::Seconds, 1)]);
        timer.start(clock.now()).unwrap();

        let err = scheduler
            .run(&mut timer, &mut |_: usize| {}, &clock, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TimerError::InvalidTimerState { .. }));
    }
}
