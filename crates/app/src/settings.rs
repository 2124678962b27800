use eontimer_core::{Console, Property, Result, Subscription, TimerSettings};

/// Editable copy of [`TimerSettings`]. Edits are only written back on
/// [`SettingsForm::accept`], after validation.
pub struct SettingsForm {
    pub console: Property<Console>,
    pub refresh_interval: Property<u64>,
    pub precision_calibration: Property<bool>,
    _watchers: (
        Subscription<Console>,
        Subscription<u64>,
        Subscription<bool>,
    ),
}

impl SettingsForm {
    pub fn new(settings: &TimerSettings) -> Self {
        let console = Property::new(settings.console);
        let refresh_interval = Property::new(settings.refresh_interval);
        let precision_calibration = Property::new(settings.precision_calibration);

        let watchers = (
            console.subscribe(|old: &Console, new: &Console| {
                tracing::info!(%old, %new, "console changed")
            }),
            refresh_interval.subscribe(|old: &u64, new: &u64| {
                tracing::info!(old, new, "refresh interval changed")
            }),
            precision_calibration.subscribe(|old: &bool, new: &bool| {
                tracing::info!(old, new, "precision calibration changed")
            }),
        );

        Self {
            console,
            refresh_interval,
            precision_calibration,
            _watchers: watchers,
        }
    }

    pub fn accept(&self, settings: &mut TimerSettings) -> Result<()> {
        let edited = TimerSettings {
            console: self.console.get(),
            refresh_interval: self.refresh_interval.get(),
            precision_calibration: self.precision_calibration.get(),
        };
        edited.validate()?;
        *settings = edited;
        Ok(())
    }
}
