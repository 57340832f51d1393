//! Producer/consumer demo over the sempipe semaphores.

use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use sempipe::config::{ConfigLoader, Pacing, PipelineProfile};
use sempipe::pipeline::{Pipeline, RandomWorkload};
use sempipe::sync::SemaphoreFlavor;
use tracing_subscriber::EnvFilter;

/// Exit status when the configuration is rejected.
const USER_ERROR: u8 = 1;
/// Exit status when the run itself fails.
const RUNTIME_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "sempipe", version, about = "Bounded-buffer producer/consumer demo")]
struct Cli {
    /// Buffer slots
    #[arg(long)]
    capacity: Option<usize>,

    /// Items to consume before shutting down
    #[arg(long = "items")]
    target: Option<usize>,

    /// Producer threads
    #[arg(long)]
    producers: Option<usize>,

    /// Consumer threads
    #[arg(long)]
    consumers: Option<usize>,

    /// Semaphore implementation for the buffer
    #[arg(long, value_enum)]
    flavor: Option<FlavorArg>,

    /// Payload seed (defaults to the clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Run without the demo's sleeps
    #[arg(long = "no-pause", action = ArgAction::SetTrue)]
    no_pause: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbosity: u8,

    /// Only print warnings and errors
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FlavorArg {
    Blocking,
    LockFree,
}

impl From<FlavorArg> for SemaphoreFlavor {
    fn from(arg: FlavorArg) -> Self {
        match arg {
            FlavorArg::Blocking => Self::Blocking,
            FlavorArg::LockFree => Self::LockFree,
        }
    }
}

impl Cli {
    fn default_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new().profile(PipelineProfile::Demo);
        let flags = [
            ("SEMPIPE_CAPACITY", self.capacity.map(|v| v.to_string())),
            ("SEMPIPE_TARGET", self.target.map(|v| v.to_string())),
            ("SEMPIPE_PRODUCERS", self.producers.map(|v| v.to_string())),
            ("SEMPIPE_CONSUMERS", self.consumers.map(|v| v.to_string())),
            ("SEMPIPE_SEED", self.seed.map(|v| v.to_string())),
            (
                "SEMPIPE_FLAVOR",
                self.flavor.map(|v| SemaphoreFlavor::from(v).to_string()),
            ),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                loader = loader.override_value(key, value);
            }
        }
        loader
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.default_level());

    let mut config = match cli.loader().load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::from(USER_ERROR);
        }
    };
    if cli.no_pause {
        config.pacing = Pacing::NONE;
    }

    let seed = config.resolve_seed();
    tracing::info!(seed, "payload seed (pass --seed to reproduce)");
    let workload = RandomWorkload::new(seed);
    let pipeline = match Pipeline::new(config, workload) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::from(USER_ERROR);
        }
    };

    match pipeline.run() {
        Ok(report) => {
            tracing::info!(
                consumed = report.consumed,
                left_in_buffer = report.in_flight(),
                stale_quit_permits = report.stale_quit_permits,
                elapsed = ?round_ms(report.elapsed),
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "pipeline failed");
            ExitCode::from(RUNTIME_ERROR)
        }
    }
}

fn round_ms(elapsed: Duration) -> Duration {
    Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
