use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use proximity_guard::runtime::sim::{RecordingEmitter, Scenario};
use proximity_guard::runtime::{
    ConfigIoError, FrameOrchestrator, SessionConfig, SessionError, SessionReport, ShutdownFlag,
    StatusLevel,
};
use proximity_guard::safety::{SafetyParams, SpeedCommand};
use proximity_guard::DistanceEstimate;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

#[derive(Parser, Debug)]
#[command(name = "proximity-guard", author, version, about = "Hand proximity safety monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log verbosity.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Emit JSON logs (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scripted scenario through a full session.
    Simulate {
        /// Scenario JSON file.
        scenario: PathBuf,

        /// Session configuration JSON; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the session report as JSON.
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Deliver frames at the scenario's frame interval instead of as fast as possible.
        #[arg(long)]
        realtime: bool,
    },

    /// Print (or write) the default session configuration.
    DefaultConfig {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: ConfigIoError,
    },
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: ConfigIoError,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Logger(#[from] log::SetLoggerError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) -> Result<(), CliError> {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init_with_filter(cli.log_level.into());
        proximity_guard::core::init_tracing(cli.log_level.into(), cli.json_logs);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        if cli.json_logs {
            eprintln!("warning: --json-logs needs the `tracing` feature; using plain logs");
        }
        proximity_guard::core::init_with_level(cli.log_level.into())?;
        Ok(())
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Simulate {
            scenario,
            config,
            report,
            realtime,
        } => simulate(&scenario, config.as_deref(), report.as_deref(), realtime),
        Command::DefaultConfig { output } => default_config(output.as_deref()),
    }
}

fn default_config(output: Option<&Path>) -> Result<(), CliError> {
    let config = SessionConfig::default();
    match output {
        Some(path) => {
            config.write_json(path).map_err(|source| CliError::Output {
                path: path.to_path_buf(),
                source,
            })?;
            println!("wrote default config to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn simulate(
    scenario_path: &Path,
    config_path: Option<&Path>,
    report_path: Option<&Path>,
    realtime: bool,
) -> Result<(), CliError> {
    let scenario = Scenario::load_json(scenario_path).map_err(|source| CliError::Input {
        path: scenario_path.to_path_buf(),
        source,
    })?;
    let config = match config_path {
        Some(path) => SessionConfig::load_json(path).map_err(|source| CliError::Input {
            path: path.to_path_buf(),
            source,
        })?,
        None => SessionConfig::default(),
    };
    let safety = config.safety.clone();

    let shutdown = ShutdownFlag::new();
    let handler_flag = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.raise()) {
        log::warn!("could not install Ctrl+C handler: {err}");
    }

    let mut detector = scenario.detector();
    if realtime {
        detector = detector.paced(Duration::from_millis(scenario.frame_interval_ms));
    }
    log::info!(
        "replaying {} frame(s) from {}",
        detector.remaining(),
        scenario_path.display()
    );

    let mut calibration = scenario.calibration();
    let mut session = FrameOrchestrator::start(
        calibration.as_mut(),
        detector,
        scenario.depth(),
        RecordingEmitter::new(),
        config,
    )?;
    let outcome = session.run(&shutdown);

    for command in session.emitter().commands() {
        println!("{}", format_command(command, &safety));
    }
    let report = match &outcome {
        Ok(report) => report.clone(),
        Err(_) => session.report().clone(),
    };
    print_summary(&report);

    if let Some(path) = report_path {
        report.write_json(path).map_err(|source| CliError::Output {
            path: path.to_path_buf(),
            source,
        })?;
    }

    outcome.map(|_| ()).map_err(CliError::from)
}

fn format_command(command: &SpeedCommand, safety: &SafetyParams) -> String {
    let distance = match command.distance {
        DistanceEstimate::Measured(m) if m.approximate => format!("~{:.3} m", m.meters),
        DistanceEstimate::Measured(m) => format!("{:.3} m", m.meters),
        DistanceEstimate::NoHand => "no hand".to_string(),
        DistanceEstimate::Undefined => "tool lost".to_string(),
    };
    format!(
        "tick {:>5}  {:<7}  {:<7} {:>3}%  {}",
        command.tick,
        StatusLevel::of(&command.distance, safety).to_string(),
        command.mode.to_string(),
        command.speed_pct,
        distance
    )
}

fn print_summary(report: &SessionReport) {
    println!(
        "ticks={} commands={} transitions={} fallback_ticks={} detector_timeouts={} stale_depth={} final={}",
        report.ticks,
        report.commands_sent,
        report.transitions.len(),
        report.fallback_ticks,
        report.detector_timeouts,
        report.stale_depth_samples,
        report.final_mode
    );
}
