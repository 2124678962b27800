//! The timer variants.
//!
//! Every variant is a plain settings record that knows how to lay out its
//! phase sequence and how to take calibration results back after a run. The
//! run-time behaviour lives entirely in [`Timer`].
//!
//! Targets and hits are signed in the settings records, like
//! [`PhaseRecord`], so a negative value read from disk surfaces as
//! [`TimerError::InvalidPhaseTarget`] when the timer is built.

use serde::{Deserialize, Serialize};

use crate::{
    phase::phases_from_records, timer::to_minimum_length, Calibrator, Phase, PhaseRecord,
    Result, Timer, TimerError, TimerSettings, Unit,
};

/// Extra lead-in the Entralink sequence needs before the delay window opens.
pub const ENTRALINK_LEAD_IN_OFFSET_MS: i64 = 250;
/// Entralink advances per second.
pub const ENTRALINK_FRAME_RATE: f64 = 0.837148929;

/// Index of the lead-in phase in the delay based sequences. Its length is
/// derived from the other settings, so it has no calibration of its own.
const LEAD_IN_PHASE: usize = 0;

fn advances_to_ms(advances: u64) -> u64 {
    (advances as f64 / ENTRALINK_FRAME_RATE * 1000.0).round() as u64
}

fn non_negative(field: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| TimerError::InvalidPhaseTarget { field, value })
}

fn stored_hit(hit: u64) -> i64 {
    i64::try_from(hit).unwrap_or(i64::MAX)
}

/// Single frame countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameTimer {
    pub target_frame: i64,
    pub calibration: f64,
    pub hit: i64,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self {
            target_frame: 1000,
            calibration: 0.0,
            hit: 0,
        }
    }
}

impl FrameTimer {
    pub fn phases(&self) -> Result<Vec<Phase>> {
        let target = non_negative("target_frame", self.target_frame)?;
        Ok(vec![Phase::new(Unit::Frames, target)
            .with_calibration(self.calibration)
            .with_hit(non_negative("hit", self.hit)?)])
    }

    pub fn store_calibration(&mut self, phases: &[Phase]) {
        if let Some(phase) = phases.first() {
            self.calibration = phase.calibration();
            self.hit = stored_hit(phase.hit());
        }
    }
}

/// Single countdown to a whole second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondTimer {
    pub target_second: i64,
    pub calibration: f64,
    pub hit: i64,
}

impl Default for SecondTimer {
    fn default() -> Self {
        Self {
            target_second: 50,
            calibration: 0.0,
            hit: 0,
        }
    }
}

impl SecondTimer {
    pub fn phases(&self) -> Result<Vec<Phase>> {
        let target = non_negative("target_second", self.target_second)?;
        Ok(vec![Phase::new(Unit::Seconds, target)
            .with_calibration(self.calibration)
            .with_hit(non_negative("hit", self.hit)?)])
    }

    pub fn store_calibration(&mut self, phases: &[Phase]) {
        if let Some(phase) = phases.first() {
            self.calibration = phase.calibration();
            self.hit = stored_hit(phase.hit());
        }
    }
}

/// A "get ready" lead-in followed by a frame accurate delay window that
/// closes on the target second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayTimer {
    pub target_second: i64,
    pub target_delay: i64,
    pub calibration: f64,
    pub delay_hit: i64,
}

impl Default for DelayTimer {
    fn default() -> Self {
        Self {
            target_second: 50,
            target_delay: 600,
            calibration: 0.0,
            delay_hit: 0,
        }
    }
}

impl DelayTimer {
    pub fn phases(&self, calibrator: &Calibrator) -> Result<Vec<Phase>> {
        self.phases_with(calibrator, 0, self.calibration)
    }

    pub fn store_calibration(&mut self, phases: &[Phase]) {
        if let Some(window) = phases.get(1) {
            self.calibration = window.calibration();
            self.delay_hit = stored_hit(window.hit());
        }
    }

    fn phases_with(
        &self,
        calibrator: &Calibrator,
        lead_in_offset: i64,
        calibration: f64,
    ) -> Result<Vec<Phase>> {
        let target_second = non_negative("target_second", self.target_second)?;
        let target_delay = non_negative("target_delay", self.target_delay)?;
        let delay_hit = non_negative("delay_hit", self.delay_hit)?;

        // Float to integer casts saturate, so absurd targets clamp instead of
        // wrapping.
        let delay_ms = calibrator.to_milliseconds(Unit::Frames, target_delay as f64);
        let lead_in = (target_second as f64 * 1000.0 - delay_ms).round() as i64;
        let lead_in = to_minimum_length(lead_in).saturating_add(lead_in_offset).max(0) as u64;

        Ok(vec![
            Phase::new(Unit::Milliseconds, lead_in),
            Phase::new(Unit::Frames, target_delay)
                .with_calibration(calibration)
                .with_hit(delay_hit),
        ])
    }
}

/// Delay sequence with the extra Entralink lead-in and its own correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntralinkTimer {
    pub target_second: i64,
    pub target_delay: i64,
    pub calibration: f64,
    pub entralink_calibration: f64,
    pub delay_hit: i64,
}

impl Default for EntralinkTimer {
    fn default() -> Self {
        Self {
            target_second: 50,
            target_delay: 1200,
            calibration: 0.0,
            entralink_calibration: 0.0,
            delay_hit: 0,
        }
    }
}

impl EntralinkTimer {
    pub fn phases(&self, calibrator: &Calibrator) -> Result<Vec<Phase>> {
        self.as_delay().phases_with(
            calibrator,
            ENTRALINK_LEAD_IN_OFFSET_MS,
            self.calibration - self.entralink_calibration,
        )
    }

    /// Folds the window's accumulated correction back into `calibration`,
    /// leaving the independently entered Entralink term untouched.
    pub fn store_calibration(&mut self, phases: &[Phase]) {
        if let Some(window) = phases.get(1) {
            self.calibration = window.calibration() + self.entralink_calibration;
            self.delay_hit = stored_hit(window.hit());
        }
    }

    fn as_delay(&self) -> DelayTimer {
        DelayTimer {
            target_second: self.target_second,
            target_delay: self.target_delay,
            calibration: self.calibration,
            delay_hit: self.delay_hit,
        }
    }
}

/// Entralink sequence plus an advances phase used by precision calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedEntralinkTimer {
    #[serde(flatten)]
    pub entralink: EntralinkTimer,
    pub target_advances: i64,
    pub advances_calibration: f64,
    pub advances_hit: i64,
}

impl EnhancedEntralinkTimer {
    pub fn phases(
        &self,
        calibrator: &Calibrator,
        precision_calibration: bool,
    ) -> Result<Vec<Phase>> {
        let mut phases = self.entralink.phases(calibrator)?;
        if precision_calibration {
            let target = non_negative("target_advances", self.target_advances)?;
            let hit = non_negative("advances_hit", self.advances_hit)?;
            phases.push(
                Phase::new(Unit::Milliseconds, advances_to_ms(target))
                    .with_calibration(self.advances_calibration)
                    .with_hit(advances_to_ms(hit)),
            );
        }
        Ok(phases)
    }

    pub fn store_calibration(&mut self, phases: &[Phase]) {
        self.entralink.store_calibration(phases);
        if let Some(advances) = phases.get(2) {
            self.advances_calibration = advances.calibration();
            if advances.hit() == 0 {
                self.advances_hit = 0;
            }
        }
    }
}

/// Operator defined sequence of independently calibrated phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomTimer {
    pub phases: Vec<PhaseRecord>,
}

impl CustomTimer {
    pub fn phases(&self) -> Result<Vec<Phase>> {
        phases_from_records(&self.phases)
    }

    pub fn store_calibration(&mut self, phases: &[Phase]) {
        self.phases = phases.iter().map(PhaseRecord::from).collect();
    }
}

/// The selected timer variant together with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerProfile {
    Frame(FrameTimer),
    Second(SecondTimer),
    Delay(DelayTimer),
    Entralink(EntralinkTimer),
    EnhancedEntralink(EnhancedEntralinkTimer),
    Custom(CustomTimer),
}

impl Default for TimerProfile {
    fn default() -> Self {
        Self::Delay(DelayTimer::default())
    }
}

impl TimerProfile {
    pub fn name(&self) -> &'static str {
        match self {
            TimerProfile::Frame(_) => "frame",
            TimerProfile::Second(_) => "second",
            TimerProfile::Delay(_) => "delay",
            TimerProfile::Entralink(_) => "entralink",
            TimerProfile::EnhancedEntralink(_) => "enhanced entralink",
            TimerProfile::Custom(_) => "custom",
        }
    }

    pub fn phases(
        &self,
        calibrator: &Calibrator,
        precision_calibration: bool,
    ) -> Result<Vec<Phase>> {
        match self {
            TimerProfile::Frame(timer) => timer.phases(),
            TimerProfile::Second(timer) => timer.phases(),
            TimerProfile::Delay(timer) => timer.phases(calibrator),
            TimerProfile::Entralink(timer) => timer.phases(calibrator),
            TimerProfile::EnhancedEntralink(timer) => {
                timer.phases(calibrator, precision_calibration)
            }
            TimerProfile::Custom(timer) => timer.phases(),
        }
    }

    /// Builds a ready-to-start timer for the configured console.
    pub fn build(&self, settings: &TimerSettings) -> Result<Timer> {
        let calibrator = settings.calibrator()?;
        let phases = self.phases(&calibrator, settings.precision_calibration)?;
        tracing::debug!(profile = self.name(), phases = phases.len(), "built timer");
        Ok(Timer::new(calibrator, phases))
    }

    /// Whether a hit on phase `index` has a setting to be stored in.
    pub fn accepts_hit(&self, index: usize) -> bool {
        match self {
            TimerProfile::Delay(_)
            | TimerProfile::Entralink(_)
            | TimerProfile::EnhancedEntralink(_) => index != LEAD_IN_PHASE,
            TimerProfile::Frame(_) | TimerProfile::Second(_) | TimerProfile::Custom(_) => true,
        }
    }

    /// Records a hit on a timer built from this profile.
    ///
    /// Hits on phases the profile derives rather than stores are rejected, so
    /// a correction is never reported and then dropped by
    /// [`TimerProfile::store_calibration`].
    pub fn set_hit(&self, timer: &mut Timer, index: usize, hit: u64) -> Result<()> {
        if !self.accepts_hit(index) {
            return Err(TimerError::PhaseNotCalibratable { index });
        }
        timer.set_hit(index, hit)
    }

    /// Copies calibration and hit state from a calibrated timer back into the
    /// profile so it can be persisted.
    pub fn store_calibration(&mut self, phases: &[Phase]) {
        match self {
            TimerProfile::Frame(timer) => timer.store_calibration(phases),
            TimerProfile::Second(timer) => timer.store_calibration(phases),
            TimerProfile::Delay(timer) => timer.store_calibration(phases),
            TimerProfile::Entralink(timer) => timer.store_calibration(phases),
            TimerProfile::EnhancedEntralink(timer) => timer.store_calibration(phases),
            TimerProfile::Custom(timer) => timer.store_calibration(phases),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Console;

    fn gba() -> Calibrator {
        Calibrator::new(Console::Gba).unwrap()
    }

    fn settings(console: Console, precision_calibration: bool) -> TimerSettings {
        TimerSettings {
            console,
            precision_calibration,
            ..TimerSettings::default()
        }
    }

    #[test]
    fn frame_and_second_timers_have_one_phase() {
        let frame = FrameTimer {
            target_frame: 60,
            calibration: 3.0,
            hit: 0,
        };
        let phases = frame.phases().unwrap();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].unit(), Unit::Frames);
        assert_eq!(phases[0].calibration(), 3.0);

        let second = SecondTimer::default().phases().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].unit(), Unit::Seconds);
        assert_eq!(second[0].target(), 50);
    }

    #[test]
    fn delay_window_closes_on_target_second() {
        let calibrator = gba();
        let timer = DelayTimer {
            target_second: 50,
            target_delay: 600,
            calibration: 0.0,
            delay_hit: 0,
        };
        let phases = timer.phases(&calibrator).unwrap();

        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].unit(), Unit::Milliseconds);
        assert_eq!(phases[0].target(), 39_954);
        assert_eq!(phases[1].unit(), Unit::Frames);
        assert_eq!(phases[1].target(), 600);

        let total: f64 = phases.iter().map(|p| p.effective_duration_ms(&calibrator)).sum();
        assert!((total - 50_000.0).abs() < 0.5);
    }

    #[test]
    fn short_delay_lead_in_gets_minute_runway() {
        let timer = DelayTimer {
            target_second: 5,
            ..DelayTimer::default()
        };
        let phases = timer.phases(&gba()).unwrap();
        assert_eq!(phases[0].target(), 54_954);
    }

    #[test]
    fn entralink_extends_lead_in_and_splits_calibration() {
        let timer = EntralinkTimer {
            target_second: 50,
            target_delay: 600,
            calibration: 20.0,
            entralink_calibration: 5.0,
            delay_hit: 0,
        };
        let phases = timer.phases(&gba()).unwrap();

        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].target(), 40_204);
        assert_eq!(phases[1].calibration(), 15.0);
    }

    #[test]
    fn entralink_calibration_survives_store() {
        let calibrator = gba();
        let mut timer = EntralinkTimer {
            target_delay: 600,
            entralink_calibration: 5.0,
            delay_hit: 598,
            ..EntralinkTimer::default()
        };
        let mut phases = timer.phases(&calibrator).unwrap();
        for phase in &mut phases {
            phase.calibrate(&calibrator);
        }
        timer.store_calibration(&phases);

        let two_frames = 2.0 * calibrator.frame_duration_ms();
        assert!((timer.calibration - two_frames).abs() < 1e-9);
        assert_eq!(timer.entralink_calibration, 5.0);
        assert_eq!(timer.delay_hit, 0);
    }

    #[test]
    fn precision_calibration_adds_advances_phase() {
        let calibrator = gba();
        let timer = EnhancedEntralinkTimer {
            target_advances: 100,
            advances_calibration: -4.0,
            ..EnhancedEntralinkTimer::default()
        };

        assert_eq!(timer.phases(&calibrator, false).unwrap().len(), 2);
        assert_eq!(
            timer.phases(&calibrator, false).unwrap(),
            timer.entralink.phases(&calibrator).unwrap()
        );

        let phases = timer.phases(&calibrator, true).unwrap();
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[2].unit(), Unit::Milliseconds);
        assert_eq!(phases[2].target(), 119_453);
        assert_eq!(phases[2].calibration(), -4.0);
    }

    #[test]
    fn custom_timer_validates_records() {
        let timer = CustomTimer {
            phases: vec![
                PhaseRecord::new(Unit::Seconds, 3),
                PhaseRecord::new(Unit::Frames, -5),
            ],
        };
        assert!(matches!(
            timer.phases(),
            Err(TimerError::InvalidPhaseTarget { .. })
        ));
    }

    #[test]
    fn profile_build_rejects_bad_framerate() {
        let profile = TimerProfile::Frame(FrameTimer::default());
        let err = profile.build(&settings(Console::Custom(-2.0), false)).unwrap_err();
        assert!(matches!(err, TimerError::InvalidFramerate(_)));
    }

    #[test]
    fn profile_round_trips_calibration_through_timer() {
        let mut profile = TimerProfile::Custom(CustomTimer {
            phases: vec![
                PhaseRecord::new(Unit::Milliseconds, 2_000),
                PhaseRecord {
                    hit: 0x40,
                    ..PhaseRecord::new(Unit::HexFrames, 0x3c)
                },
            ],
        });
        let mut timer = profile.build(&settings(Console::Gba, false)).unwrap();
        timer.calibrate().unwrap();
        profile.store_calibration(timer.phases());

        let TimerProfile::Custom(custom) = &profile else {
            panic!("profile changed variant");
        };
        assert_eq!(custom.phases[0].calibration, 0.0);
        assert_eq!(custom.phases[1].hit, 0);
        let expected = -4.0 * Console::Gba.frame_duration_ms();
        assert!((custom.phases[1].calibration - expected).abs() < 1e-9);
    }

    #[test]
    fn enhanced_profile_follows_precision_flag() {
        let profile = TimerProfile::EnhancedEntralink(EnhancedEntralinkTimer::default());
        let coarse = profile.build(&settings(Console::NdsSlot1, false)).unwrap();
        let precise = profile.build(&settings(Console::NdsSlot1, true)).unwrap();
        assert_eq!(coarse.phases().len(), 2);
        assert_eq!(precise.phases().len(), 3);
    }

    #[test]
    fn absurd_delay_clamps_lead_in_instead_of_overflowing() {
        let profile: TimerProfile =
            serde_json::from_str(r#"{"delay": {"target_delay": 1000000000000000000}}"#).unwrap();
        let timer = profile.build(&settings(Console::Gba, false)).unwrap();

        let lead_in = timer.phases()[0].target();
        assert!((14_000..74_000).contains(&lead_in), "lead-in {lead_in}");
        assert_eq!(timer.phases()[1].target(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn absurd_entralink_second_saturates_lead_in() {
        let profile = TimerProfile::Entralink(EntralinkTimer {
            target_second: i64::MAX,
            ..EntralinkTimer::default()
        });
        let timer = profile.build(&settings(Console::NdsSlot1, false)).unwrap();
        assert_eq!(timer.phases()[0].target(), i64::MAX as u64);
    }

    #[test]
    fn negative_settings_are_reported_by_field() {
        let profile: TimerProfile =
            serde_json::from_str(r#"{"delay": {"target_delay": -5}}"#).unwrap();
        assert!(matches!(
            profile.build(&settings(Console::Gba, false)),
            Err(TimerError::InvalidPhaseTarget {
                field: "target_delay",
                value: -5
            })
        ));

        let frame = FrameTimer {
            hit: -1,
            ..FrameTimer::default()
        };
        assert!(matches!(
            frame.phases(),
            Err(TimerError::InvalidPhaseTarget { field: "hit", .. })
        ));

        let enhanced = EnhancedEntralinkTimer {
            target_advances: -3,
            ..EnhancedEntralinkTimer::default()
        };
        assert!(enhanced.phases(&gba(), false).is_ok());
        assert!(matches!(
            enhanced.phases(&gba(), true),
            Err(TimerError::InvalidPhaseTarget {
                field: "target_advances",
                ..
            })
        ));
    }

    #[test]
    fn derived_lead_in_rejects_hits() {
        for profile in [
            TimerProfile::Delay(DelayTimer::default()),
            TimerProfile::Entralink(EntralinkTimer::default()),
            TimerProfile::EnhancedEntralink(EnhancedEntralinkTimer::default()),
        ] {
            let mut timer = profile.build(&settings(Console::Gba, true)).unwrap();
            assert!(!profile.accepts_hit(0));
            assert!(matches!(
                profile.set_hit(&mut timer, 0, 40_000),
                Err(TimerError::PhaseNotCalibratable { index: 0 })
            ));
            assert_eq!(timer.phases()[0].hit(), 0);
            profile.set_hit(&mut timer, 1, 598).unwrap();
            assert_eq!(timer.phases()[1].hit(), 598);
        }

        let frame = TimerProfile::Frame(FrameTimer::default());
        let mut timer = frame.build(&settings(Console::Gba, false)).unwrap();
        frame.set_hit(&mut timer, 0, 995).unwrap();
        assert!(matches!(
            frame.set_hit(&mut timer, 1, 5),
            Err(TimerError::PhaseOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn delay_window_hit_is_persisted() {
        let mut profile = TimerProfile::Delay(DelayTimer::default());
        let mut timer = profile.build(&settings(Console::Gba, false)).unwrap();
        profile.set_hit(&mut timer, 1, 603).unwrap();
        timer.calibrate().unwrap();
        profile.store_calibration(timer.phases());

        let TimerProfile::Delay(delay) = &profile else {
            panic!("profile changed variant");
        };
        let expected = -3.0 * Console::Gba.frame_duration_ms();
        assert!((delay.calibration - expected).abs() < 1e-9);
        assert_eq!(delay.delay_hit, 0);
    }
}
