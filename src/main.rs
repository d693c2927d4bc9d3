mod config;
mod countdown;
mod guard;
mod output;
mod packet;
mod session;
mod signals;
mod supervisor;
mod tee;

use clap::Parser;
use config::{Flags, RunConfiguration, StartupError};
use signals::{ExitSignal, SignalListener};
use std::path::PathBuf;
use std::process::ExitCode;
use supervisor::Supervisor;
use tracing_subscriber::EnvFilter;

/// Run a command under supervision: forward its output, optionally time it,
/// and restart it after a cancellable countdown.
#[derive(Parser, Debug)]
#[command(name = "wrapperutil", version, about)]
pub struct Cli {
    /// Auto-restart unless cancelled
    #[arg(short = 'r')]
    restart: bool,

    /// Shorter auto-restart timeout
    #[arg(short = 's')]
    shorter: bool,

    /// Measure execution time
    #[arg(short = 't')]
    timer: bool,

    /// Enable program to send command packets to WrapperUtil
    #[arg(short = 'p')]
    packets: bool,

    /// Settings file (TOML) with restart timeouts
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Command to supervise, followed by its arguments
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    command: Vec<String>,
}

impl Cli {
    fn into_flags(self) -> Flags {
        Flags {
            restart: self.restart,
            shorter: self.shorter,
            timer: self.timer,
            packets: self.packets,
            config: self.config,
            command: self.command,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn start() -> Result<(), StartupError> {
    // Refuse before anything else, including --help.
    guard::check_env()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = RunConfiguration::build(cli.into_flags())?;
    tracing::debug!(?config, "resolved configuration");

    let exit = ExitSignal::new();
    let _listener = match SignalListener::install(exit.clone()) {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!(error = %e, "failed to install interrupt handler, restarts cannot be cancelled");
            None
        }
    };

    let runs = Supervisor::new(config, exit).run().await;
    tracing::debug!(runs, "supervisor finished");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&e.to_string(), None);
            ExitCode::FAILURE
        }
    }
}
