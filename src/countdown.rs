/// Visible, cancellable countdown before a restart.
use crate::signals::ExitSignal;
use std::io::Write;
use std::time::Duration;

const TICK: Duration = Duration::from_secs(1);

/// How a countdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Reached zero without an exit request: restart the child.
    Elapsed,
    /// Exit was requested: stop supervising.
    Cancelled,
}

/// Count from `secs` down to 0, one tick per second, rewriting one line of `out`.
///
/// The exit flag is checked after every tick, including the final tick at 0,
/// so a zero-length countdown still honours an earlier interrupt. The wait
/// between ticks is cut short as soon as the flag is set.
pub async fn run<W: Write>(secs: u64, exit: &ExitSignal, out: &mut W) -> CountdownOutcome {
    tracing::debug!(secs, "restart countdown started");

    for remaining in (0..=secs).rev() {
        let _ = write!(out, "\rRestarting in {remaining}... Cancel with Ctrl+C ");
        let _ = out.flush();

        if remaining != 0 {
            tokio::select! {
                _ = tokio::time::sleep(TICK) => {}
                _ = exit.wait() => {}
            }
        }

        if exit.is_set() {
            let _ = writeln!(out);
            tracing::debug!(remaining, "restart countdown cancelled");
            return CountdownOutcome::Cancelled;
        }
    }

    let _ = writeln!(out);
    CountdownOutcome::Elapsed
}
