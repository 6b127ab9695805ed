//! Session logger.
//!
//! Records go to stderr as
//!
//! ```text
//!    0.412s  WARN runtime/pipeline  tick 17  depth sampler gave no answer ...
//! ```
//!
//! The tick column shows the tick the orchestrator is currently working on
//! (see [`set_log_tick`]) and `-` outside a tick. Install once with
//! [`init_with_level`]; with the `tracing` feature, [`init_tracing`] installs a
//! `tracing` subscriber instead.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

/// Tick being processed; `0` means no tick is in flight.
static CURRENT_TICK: AtomicU64 = AtomicU64::new(0);

/// Tag subsequent log records with `tick` (`0` clears the tag).
#[inline]
pub fn set_log_tick(tick: u64) {
    CURRENT_TICK.store(tick, Ordering::Relaxed);
}

struct SessionLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = render(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            CURRENT_TICK.load(Ordering::Relaxed),
            record.target(),
            record.args(),
        );
        // Sensor threads log concurrently; one write per record.
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// `proximity_guard_runtime::orchestrator::pipeline` -> `runtime/pipeline`.
fn short_target(target: &str) -> String {
    let mut parts = target.split("::");
    let krate = parts.next().unwrap_or(target);
    let krate = krate.strip_prefix("proximity_guard_").unwrap_or(krate);
    match parts.last() {
        Some(module) => format!("{krate}/{module}"),
        None => krate.to_string(),
    }
}

fn render(elapsed_s: f64, level: Level, tick: u64, target: &str, args: &fmt::Arguments) -> String {
    let tick = match tick {
        0 => "-".to_string(),
        t => t.to_string(),
    };
    format!(
        "{elapsed_s:8.3}s {level:>5} {:<18} tick {tick:<6} {args}\n",
        short_target(target)
    )
}

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

/// Install the session logger with the provided level filter.
///
/// Later calls are no-ops once a logger is installed.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| SessionLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise events at `level` and above are kept.
/// Per-tick spans are closed with their timing so a slow tick is visible.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    if json {
        let _ = builder
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = builder
            .compact()
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
