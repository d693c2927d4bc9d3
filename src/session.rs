/// One supervised run: spawn the child, forward its streams, wait for exit.
use crate::config::RunConfiguration;
use crate::guard::{GUARD_VALUE, NAME};
use crate::tee;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Outcome of a single run of the child.
#[derive(Debug)]
pub struct SessionResult {
    /// Why the run did not succeed, if it didn't.
    pub error: Option<SessionError>,
    /// Child stdout after its last newline (only when packets are enabled).
    pub captured: Option<Vec<u8>>,
    /// Wall-clock duration (only when timing is enabled).
    pub duration: Option<Duration>,
}

/// Errors that can occur while running the child. None of them stop supervision.
#[derive(Debug)]
pub enum SessionError {
    /// The command could not be started.
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// Waiting for the child failed.
    Wait { source: std::io::Error },
    /// The child exited unsuccessfully.
    Exit { status: ExitStatus },
    /// The tee task died before the child's stdout closed.
    Output { source: tokio::task::JoinError },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program, source)
            }
            SessionError::Wait { source } => {
                write!(f, "failed to wait for child: {}", source)
            }
            SessionError::Exit { status } => write!(f, "child {}", status),
            SessionError::Output { source } => {
                write!(f, "failed to capture child output: {}", source)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn { source, .. } => Some(source),
            SessionError::Wait { source } => Some(source),
            SessionError::Exit { .. } => None,
            SessionError::Output { source } => Some(source),
        }
    }
}

/// Build the child command: inherited stdin/stderr, guard variable exported,
/// stdout piped only when it has to be teed.
fn build_command(config: &RunConfiguration) -> Command {
    let mut cmd = Command::new(&config.command[0]);
    cmd.args(&config.command[1..])
        .env(NAME, GUARD_VALUE)
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit());

    if config.packets_enabled {
        cmd.stdout(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit());
    }
    cmd
}

/// Run the configured command once and report what happened.
pub async fn run_session(config: &RunConfiguration) -> SessionResult {
    let start = Instant::now();
    let (error, captured) = run_child(config).await;
    let duration = config.measure_time.then(|| start.elapsed());

    SessionResult {
        error,
        captured,
        duration,
    }
}

async fn run_child(config: &RunConfiguration) -> (Option<SessionError>, Option<Vec<u8>>) {
    tracing::info!(command = ?config.command, "spawning child");

    let mut child = match build_command(config).spawn() {
        Ok(child) => child,
        Err(e) => {
            let error = SessionError::Spawn {
                program: config.command[0].clone(),
                source: e,
            };
            // Nothing ran, so there is nothing to scan for a packet.
            return (Some(error), config.packets_enabled.then(Vec::new));
        }
    };

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, "child started");

    let tee_task = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(tee::tee(stdout, tokio::io::stdout())));

    let status = child.wait().await;

    let mut error = match status {
        Ok(status) if status.success() => None,
        Ok(status) => Some(SessionError::Exit { status }),
        Err(e) => Some(SessionError::Wait { source: e }),
    };

    let captured = match tee_task {
        Some(task) => match task.await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                if error.is_none() {
                    error = Some(SessionError::Output { source: e });
                }
                Some(Vec::new())
            }
        },
        None => None,
    };

    tracing::info!(pid, success = error.is_none(), "child finished");
    (error, captured)
}
