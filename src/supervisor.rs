//! The supervisor loop.
//!
//! Each cycle spawns the child, waits for it, reports timing, reads the
//! control packet (with `-p`), and decides whether to restart. Restarts go
//! through a cancellable countdown; anything that goes wrong with the child
//! itself is reported and the loop carries on.

use crate::config::RunConfiguration;
use crate::countdown::{self, CountdownOutcome};
use crate::output;
use crate::packet::{self, ControlPacket, Extraction};
use crate::session::{self, SessionError, SessionResult};
use crate::signals::ExitSignal;
use std::io::Write;

/// What to do after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Restart { timeout_secs: u64 },
    Terminate,
}

/// Restart when auto-restart is on or the child asked for it, unless the
/// child asked to exit. A child-requested restart always uses the short timeout.
pub fn decide(config: &RunConfiguration, packet: ControlPacket) -> Decision {
    if !(config.auto_restart || packet.restart) || packet.exit {
        return Decision::Terminate;
    }

    let timeout_secs = if packet.restart || config.short_timeout {
        config.timeouts.short_secs
    } else {
        config.timeouts.normal_secs
    };
    Decision::Restart { timeout_secs }
}

pub struct Supervisor {
    config: RunConfiguration,
    exit: ExitSignal,
}

impl Supervisor {
    pub fn new(config: RunConfiguration, exit: ExitSignal) -> Self {
        Self { config, exit }
    }

    /// Supervise until a run ends without a restart or a countdown is
    /// cancelled. Returns the number of runs.
    pub async fn run(&self) -> u64 {
        let mut runs: u64 = 0;

        loop {
            println!();
            let result = session::run_session(&self.config).await;
            runs = next_run(runs);
            println!();

            let packet = self.collect(&result);
            let decision = decide(&self.config, packet);
            tracing::debug!(run = runs, ?packet, ?decision, "run complete");

            let Decision::Restart { timeout_secs } = decision else {
                break;
            };

            if self.wait_for_restart(timeout_secs).await == CountdownOutcome::Cancelled {
                tracing::info!(runs, "restart cancelled");
                break;
            }
            tracing::info!(run = next_run(runs), "restarting child");
        }

        output::info("Exiting!");
        runs
    }

    /// Report the run and pull the control packet out of its output.
    fn collect(&self, result: &SessionResult) -> ControlPacket {
        if let Some(error) = &result.error {
            report_session_error(error);
        }

        if let Some(duration) = result.duration {
            output::info(&format!("Program finished! Took {duration:?}"));
        }

        let Some(captured) = &result.captured else {
            return ControlPacket::default();
        };

        let extraction = packet::extract(captured);
        if let Extraction::Invalid(e) = &extraction {
            tracing::debug!(error = %e, "ignoring malformed control packet");
            output::error(&e.to_string(), None);
        }
        extraction.packet()
    }

    async fn wait_for_restart(&self, timeout_secs: u64) -> CountdownOutcome {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", output::countdown_color());
        let outcome = countdown::run(timeout_secs, &self.exit, &mut stdout).await;
        let _ = write!(stdout, "{}", output::reset());
        let _ = stdout.flush();
        outcome
    }
}

/// Run counter that cannot overflow, however fast the child restarts.
fn next_run(runs: u64) -> u64 {
    runs.saturating_add(1)
}

fn report_session_error(error: &SessionError) {
    tracing::debug!(%error, "child run failed");
    match error {
        SessionError::Spawn { .. } => output::error("Couldn't start", Some(error)),
        _ => output::error("Program failed", Some(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartTimeouts;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn config(auto_restart: bool, short_timeout: bool) -> RunConfiguration {
        RunConfiguration {
            auto_restart,
            short_timeout,
            measure_time: false,
            packets_enabled: false,
            command: vec!["true".to_string()],
            timeouts: RestartTimeouts::default(),
        }
    }

    fn packet(restart: bool, exit: bool) -> ControlPacket {
        ControlPacket { restart, exit }
    }

    /// Shell command that appends a line to `log` every time it runs.
    fn logging_command(log: &Path, rest: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo run >> '{}'; {}", log.display(), rest),
        ]
    }

    /// Collects formatted tracing output at the default `warn` level.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn warn_level_logs(f: impl FnOnce()) -> String {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn run_count(log: &Path) -> usize {
        std::fs::read_to_string(log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn test_no_flags_no_packet_terminates() {
        assert_eq!(
            decide(&config(false, false), ControlPacket::default()),
            Decision::Terminate
        );
    }

    #[test]
    fn test_auto_restart_uses_normal_timeout() {
        assert_eq!(
            decide(&config(true, false), ControlPacket::default()),
            Decision::Restart { timeout_secs: 10 }
        );
    }

    #[test]
    fn test_auto_restart_with_short_flag() {
        assert_eq!(
            decide(&config(true, true), ControlPacket::default()),
            Decision::Restart { timeout_secs: 3 }
        );
    }

    #[test]
    fn test_exit_packet_overrides_auto_restart() {
        for short in [false, true] {
            assert_eq!(
                decide(&config(true, short), packet(false, true)),
                Decision::Terminate
            );
        }
    }

    #[test]
    fn test_exit_wins_over_restart_in_same_packet() {
        assert_eq!(
            decide(&config(true, false), packet(true, true)),
            Decision::Terminate
        );
    }

    #[test]
    fn test_restart_packet_always_short() {
        for auto in [false, true] {
            for short in [false, true] {
                assert_eq!(
                    decide(&config(auto, short), packet(true, false)),
                    Decision::Restart { timeout_secs: 3 }
                );
            }
        }
    }

    #[test]
    fn test_configured_timeouts() {
        let mut cfg = config(true, false);
        cfg.timeouts = RestartTimeouts {
            normal_secs: 30,
            short_secs: 1,
        };
        assert_eq!(
            decide(&cfg, ControlPacket::default()),
            Decision::Restart { timeout_secs: 30 }
        );
        assert_eq!(
            decide(&cfg, packet(true, false)),
            Decision::Restart { timeout_secs: 1 }
        );
    }

    #[test]
    fn test_run_counter_saturates() {
        assert_eq!(next_run(0), 1);
        assert_eq!(next_run(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_child_failure_not_logged_at_default_level() {
        let error = SessionError::Spawn {
            program: "nonexistent-binary-xyz".to_string(),
            source: std::io::ErrorKind::NotFound.into(),
        };
        let logs = warn_level_logs(|| report_session_error(&error));
        assert!(logs.is_empty(), "unexpected log output: {logs}");
    }

    #[test]
    fn test_malformed_packet_not_logged_at_default_level() {
        let mut cfg = config(false, false);
        cfg.packets_enabled = true;
        let supervisor = Supervisor::new(cfg, ExitSignal::new());
        let result = SessionResult {
            error: None,
            captured: Some(b"wrapperutil{\"Restart\":".to_vec()),
            duration: None,
        };

        let mut packet = None;
        let logs = warn_level_logs(|| packet = Some(supervisor.collect(&result)));

        assert!(logs.is_empty(), "unexpected log output: {logs}");
        assert_eq!(packet, Some(ControlPacket::default()));
    }

    #[tokio::test]
    async fn test_runs_once_without_restart_flags() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(false, false);
        cfg.command = logging_command(&log, "true");

        let runs = Supervisor::new(cfg, ExitSignal::new()).run().await;

        assert_eq!(runs, 1);
        assert_eq!(run_count(&log), 1);
    }

    #[tokio::test]
    async fn test_failing_child_does_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(false, false);
        cfg.measure_time = true;
        cfg.command = logging_command(&log, "exit 7");

        assert_eq!(Supervisor::new(cfg, ExitSignal::new()).run().await, 1);
    }

    #[tokio::test]
    async fn test_missing_executable_terminates_cleanly() {
        let mut cfg = config(false, false);
        cfg.packets_enabled = true;
        cfg.command = vec!["nonexistent-binary-xyz".to_string()];

        assert_eq!(Supervisor::new(cfg, ExitSignal::new()).run().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_countdown_stops_auto_restart() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(true, false);
        cfg.command = logging_command(&log, "true");

        let exit = ExitSignal::new();
        exit.set();
        let runs = Supervisor::new(cfg, exit).run().await;

        assert_eq!(runs, 1);
        assert_eq!(run_count(&log), 1);
    }

    #[tokio::test]
    async fn test_packet_restart_then_exit() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(false, false);
        cfg.packets_enabled = true;
        cfg.timeouts.short_secs = 0;
        cfg.command = logging_command(
            &log,
            &format!(
                "if [ $(wc -l < '{}') -ge 3 ]; then printf 'done\\nwrapperutil{{\"Exit\":true}}'; \
                 else printf 'wrapperutil{{\"Restart\":true}}'; fi",
                log.display()
            ),
        );

        let runs = Supervisor::new(cfg, ExitSignal::new()).run().await;

        assert_eq!(runs, 3);
        assert_eq!(run_count(&log), 3);
    }

    #[tokio::test]
    async fn test_exit_packet_stops_auto_restart() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(true, false);
        cfg.packets_enabled = true;
        cfg.timeouts.normal_secs = 0;
        cfg.command = logging_command(&log, "printf 'wrapperutil{\"Exit\":true}'");

        assert_eq!(Supervisor::new(cfg, ExitSignal::new()).run().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_packet_acts_as_no_packet() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(false, false);
        cfg.packets_enabled = true;
        cfg.command = logging_command(&log, "printf 'wrapperutil{\"Restart\":'");

        assert_eq!(Supervisor::new(cfg, ExitSignal::new()).run().await, 1);
        assert_eq!(run_count(&log), 1);
    }

    #[tokio::test]
    async fn test_packets_ignored_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("runs");
        let mut cfg = config(false, false);
        cfg.command = logging_command(&log, "printf 'wrapperutil{\"Restart\":true}'");

        assert_eq!(Supervisor::new(cfg, ExitSignal::new()).run().await, 1);
    }
}
