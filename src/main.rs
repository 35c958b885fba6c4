//! Pulse - Client-side polling with observer fan-out
//!
//! CLI entry point for the Pulse poller.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pulse::cycle::config::{CycleOptions, FetchOptions, PulseConfig};
use pulse::cycle::controller::CycleController;
use pulse::cycle::observer::observer;
use pulse::log::{EnvelopeLog, EnvelopeRecord};
use pulse::TickDisplay;

/// Client-side poller with observer fan-out
///
/// Runs timed fetch (or counter) cycles against an HTTP resource and
/// renders every tick, keeping an append-only JSONL history.
#[derive(Parser, Debug)]
#[command(name = "pulse", version, about)]
struct Cli {
    /// Directory for log files (.pulse by default)
    #[arg(long, default_value = ".pulse", global = true)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a named poll from a pulse.toml profile
    Run {
        /// Name of the poll to run
        name: String,

        /// Path to the pulse.toml configuration file
        #[arg(long, default_value = "pulse.toml")]
        config: PathBuf,
    },
    /// Poll a URL directly, without a configuration file
    Poll {
        /// Resource URL to poll
        url: String,

        /// Request header in NAME=VALUE form (repeatable)
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// Number of ticks before stopping
        #[arg(long, default_value_t = 1)]
        stop_count: u64,

        /// Keep polling until interrupted
        #[arg(long)]
        forever: bool,

        /// Seconds to wait before each tick
        #[arg(long, default_value_t = 0.0)]
        interval_seconds: f64,
    },
    /// Emit counter ticks without fetching anything
    Tick {
        /// Number of ticks before stopping
        #[arg(long, default_value_t = 1)]
        stop_count: u64,

        /// Keep ticking until interrupted
        #[arg(long)]
        forever: bool,

        /// Seconds to wait before each tick
        #[arg(long, default_value_t = 1.0)]
        interval_seconds: f64,
    },
}

/// Parse one `NAME=VALUE` header argument.
fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("invalid header '{raw}': expected NAME=VALUE"),
    }
}

/// Resolve the effective stop count from CLI flags.
const fn effective_stop_count(stop_count: u64, forever: bool) -> Option<u64> {
    if forever {
        None
    } else {
        Some(stop_count)
    }
}

/// Parse an interval flag into a `Duration`.
fn parse_interval(interval_seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(interval_seconds)
        .map_err(|_| anyhow::anyhow!("interval_seconds must be a non-negative number"))
}

/// Resolve a subcommand into the poll's name, fetch, and cycle options.
fn resolve_command(command: &Command) -> Result<(String, FetchOptions, CycleOptions<()>)> {
    match command {
        Command::Run { name, config } => {
            let config = PulseConfig::from_path(config)
                .with_context(|| format!("Failed to load config from '{}'", config.display()))?;
            let poll = config.get_poll(name).with_context(|| {
                format!(
                    "Unknown poll '{name}'. Available polls: {}",
                    available_poll_names(&config)
                )
            })?;
            let options = poll
                .cycle_options()
                .with_context(|| format!("Invalid options for poll '{name}'"))?;
            Ok((poll.name.clone(), poll.fetch_options(), options))
        }
        Command::Poll {
            url,
            headers,
            stop_count,
            forever,
            interval_seconds,
        } => {
            let headers: HashMap<String, String> = headers
                .iter()
                .map(|raw| parse_header(raw))
                .collect::<Result<_>>()?;
            let fetch = FetchOptions {
                path: url.clone(),
                headers,
            };
            let options = CycleOptions {
                stop_count: effective_stop_count(*stop_count, *forever),
                interval: parse_interval(*interval_seconds)?,
                ..CycleOptions::default()
            };
            Ok((url.clone(), fetch, options))
        }
        Command::Tick {
            stop_count,
            forever,
            interval_seconds,
        } => {
            let options = CycleOptions {
                stop_count: effective_stop_count(*stop_count, *forever),
                interval: parse_interval(*interval_seconds)?,
                ..CycleOptions::default()
            };
            Ok(("tick".to_string(), FetchOptions::ticker(), options))
        }
    }
}

/// Format available poll names for error messages.
fn available_poll_names(config: &PulseConfig) -> String {
    config
        .polls
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run one poll cycle to completion, rendering and logging every tick.
async fn run_poll(
    name: String,
    fetch: FetchOptions,
    options: CycleOptions<()>,
    log_dir: &Path,
) -> Result<()> {
    let display = Arc::new(TickDisplay::new(&name));
    let log = Arc::new(EnvelopeLog::new(log_dir).context("Failed to initialize JSONL log")?);
    let path = if fetch.path.is_empty() {
        None
    } else {
        Some(fetch.path.clone())
    };
    display.print_header(path.as_deref());

    let controller = CycleController::new(fetch, options);

    let tick_observer = {
        let display = Arc::clone(&display);
        let log = Arc::clone(&log);
        let name = name.clone();
        let delivered = AtomicU64::new(0);
        observer(move |(), envelope| {
            let tick = delivered.fetch_add(1, Ordering::SeqCst) + 1;
            display.render_tick(tick, envelope);
            let logged = EnvelopeRecord::from_envelope(name.clone(), tick, envelope)
                .and_then(|record| log.append(&record));
            if let Err(err) = logged {
                warn!(error = %err, "failed to record envelope");
            }
        })
    };

    let mut handle = controller
        .subscribe(tick_observer, Arc::new(()))
        .context("Poll cycle failed to start")?;

    // First Ctrl-C aborts the cycle; the loop then winds down on its own.
    let outcome = tokio::select! {
        outcome = &mut handle => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, aborting poll cycle.");
            controller.abort_cycle(&()).await;
            (&mut handle).await
        }
    };

    match outcome.context("Poll cycle task panicked")? {
        Ok(()) => {
            display.render_summary(controller.state(), controller.tick_count());
            Ok(())
        }
        Err(err) => {
            display.render_error(&err);
            Err(err).context(format!("Poll '{name}' halted"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulse=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (name, fetch, options) = resolve_command(&cli.command)?;
    run_poll(name, fetch, options, &cli.log_dir).await
}
