mod action;
mod settings;

use std::path::{Path, PathBuf};

use action::ActionMode;
use clap::{Parser, Subcommand, ValueEnum};
use eontimer_core::{
    AppConfig, CancelToken, Console, Scheduler, SystemClock, Timer, TimerError, TimerState, Unit,
};
use settings::SettingsForm;
use tracing_subscriber::EnvFilter;

fn main() -> eontimer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::Init { force } => run_init(&path, force),
        Commands::Show => run_show(&path),
        Commands::Run { action } => run_timer(&path, action),
        Commands::Calibrate { hits } => run_calibrate(&path, &hits),
        Commands::SetConsole { console, fps } => {
            edit_settings(&path, |form| form.console.set(console.resolve(fps)))
        }
        Commands::SetRefresh { interval } => {
            edit_settings(&path, |form| form.refresh_interval.set(interval))
        }
        Commands::SetPrecision { enabled } => {
            edit_settings(&path, |form| form.precision_calibration.set(enabled))
        }
    }
}

fn run_init(path: &Path, force: bool) -> eontimer_core::Result<()> {
    if path.exists() && !force {
        return Err(TimerError::msg(format!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        )));
    }
    save_config(path, &AppConfig::default())
}

fn run_show(path: &Path) -> eontimer_core::Result<()> {
    let config = load_config(path)?;
    let timer = config.profile.build(&config.timer)?;
    let calibrator = timer.calibrator();

    println!(
        "{} timer on {} ({:.4} ms/frame, refresh {} ms)",
        config.profile.name(),
        calibrator.console(),
        calibrator.frame_duration_ms(),
        config.timer.refresh_interval
    );
    for (index, (phase, duration)) in timer.phases().iter().zip(timer.durations_ms()).enumerate() {
        println!(
            "{:>3}. {:>12} {:<10} calibration {:>+10.3} ms ({:+.2} frames)  hit {:>8}  -> {:.3} ms",
            index + 1,
            format_value(phase.unit(), phase.target()),
            phase.unit(),
            phase.calibration(),
            calibrator.to_frames(phase.calibration()),
            format_value(phase.unit(), phase.hit()),
            duration
        );
    }
    println!("total {:.3} ms", timer.total_duration_ms());
    Ok(())
}

fn run_timer(path: &Path, mode: ActionMode) -> eontimer_core::Result<()> {
    let config = load_config(path)?;
    let mut timer = config.profile.build(&config.timer)?;
    let mut scheduler = Scheduler::from_millis(config.timer.refresh_interval)?;
    let _status = scheduler
        .state()
        .subscribe(|old: &TimerState, new: &TimerState| {
            tracing::info!(%old, %new, "timer state changed")
        });

    let cancel = CancelToken::new();
    watch_for_cancel(cancel.clone());

    tracing::info!(
        profile = config.profile.name(),
        console = %config.timer.console,
        total_ms = timer.total_duration_ms(),
        "press enter to cancel"
    );
    let (mut notifier, worker) = action::spawn(mode, timer.phases().len());
    let state = scheduler.run(&mut timer, &mut notifier, &SystemClock, &cancel)?;

    drop(notifier);
    if worker.join().is_err() {
        tracing::warn!("action worker panicked");
    }
    tracing::info!(%state, "run finished");
    Ok(())
}

fn run_calibrate(path: &Path, hits: &[HitArg]) -> eontimer_core::Result<()> {
    let mut config = load_config(path)?;
    let mut timer = config.profile.build(&config.timer)?;
    for hit in hits {
        config.profile.set_hit(&mut timer, hit.index, hit.value)?;
    }

    let deltas = timer.calibrate()?;
    report_calibration(&timer, &deltas);
    config.profile.store_calibration(timer.phases());
    save_config(path, &config)
}

fn report_calibration(timer: &Timer, deltas: &[f64]) {
    for (index, (phase, delta)) in timer.phases().iter().zip(deltas).enumerate() {
        if *delta != 0.0 {
            println!(
                "phase {}: {:+.3} ms -> calibration {:.3} ms",
                index + 1,
                delta,
                phase.calibration()
            );
        }
    }
}

fn edit_settings(
    path: &Path,
    edit: impl FnOnce(&mut SettingsForm),
) -> eontimer_core::Result<()> {
    let mut config = load_config(path)?;
    let mut form = SettingsForm::new(&config.timer);
    edit(&mut form);
    form.accept(&mut config.timer)?;
    save_config(path, &config)
}

/// Cancels the run when the operator presses enter.
fn watch_for_cancel(cancel: CancelToken) {
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_ok() {
            cancel.cancel();
        }
    });
}

fn format_value(unit: Unit, value: u64) -> String {
    match unit {
        Unit::HexFrames => format!("{value:#x}"),
        _ => value.to_string(),
    }
}

fn load_config(path: &Path) -> eontimer_core::Result<AppConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no settings file, using defaults");
        return Ok(AppConfig::default());
    }
    let json = std::fs::read_to_string(path)?;
    AppConfig::from_json_str(&json)
}

fn save_config(path: &Path, config: &AppConfig) -> eontimer_core::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_json_string()?)?;
    tracing::info!(path = %path.display(), "settings saved");
    Ok(())
}

fn default_config_path() -> eontimer_core::Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| TimerError::msg("no configuration directory on this platform"))?;
    Ok(dir.join("eontimer").join("settings.json"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HitArg {
    index: usize,
    value: u64,
}

/// Parses `INDEX=VALUE`, with a one-based index. Values may be written in
/// hex with a `0x` prefix.
fn parse_hit(raw: &str) -> Result<HitArg, String> {
    let (index, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=VALUE, got `{raw}`"))?;
    let index: usize = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid phase index `{index}`"))?;
    if index == 0 {
        return Err("phase indices start at 1".to_string());
    }

    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    let value = parsed.map_err(|_| format!("invalid hit value `{value}`"))?;

    Ok(HitArg {
        index: index - 1,
        value,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConsoleArg {
    Gba,
    NdsSlot1,
    NdsSlot2,
    Dsi,
    #[value(name = "3ds")]
    ThreeDs,
    Custom,
}

impl ConsoleArg {
    fn resolve(self, fps: Option<f64>) -> Console {
        match self {
            ConsoleArg::Gba => Console::Gba,
            ConsoleArg::NdsSlot1 => Console::NdsSlot1,
            ConsoleArg::NdsSlot2 => Console::NdsSlot2,
            ConsoleArg::Dsi => Console::Dsi,
            ConsoleArg::ThreeDs => Console::ThreeDs,
            // Validation on accept reports a missing rate as an invalid framerate.
            ConsoleArg::Custom => Console::Custom(fps.unwrap_or(0.0)),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Frame-accurate timer for console RNG manipulation", long_about = None)]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the phases of the configured timer.
    Show,
    /// Run the configured timer on the system clock.
    Run {
        /// Which cues to produce at each phase boundary.
        #[arg(short, long, value_enum, default_value_t = ActionMode::Av)]
        action: ActionMode,
    },
    /// Fold observed hits into the stored calibration.
    Calibrate {
        /// Observed value for a phase as INDEX=VALUE (one-based index, value in
        /// the phase's unit; the precision calibration phase takes milliseconds).
        /// The lead-in of delay based timers is derived and takes no hits.
        #[arg(long = "hit", value_parser = parse_hit)]
        hits: Vec<HitArg>,
    },
    /// Select the console whose framerate is used.
    SetConsole {
        #[arg(value_enum)]
        console: ConsoleArg,
        /// Frames per second for a custom console.
        #[arg(long)]
        fps: Option<f64>,
    },
    /// Set the scheduler tick interval in milliseconds.
    SetRefresh { interval: u64 },
    /// Toggle the extra precision calibration phase.
    SetPrecision {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}
