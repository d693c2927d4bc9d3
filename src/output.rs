//! User-facing terminal messages.
//!
//! Supervisor chatter is cyan on stdout and errors are bold red on stderr, so
//! they stand apart from the child's own output. Color is dropped for a stream
//! that is not a terminal, or everywhere when `NO_COLOR` is set.

use std::io::IsTerminal;
use std::sync::LazyLock;

const CYAN: &str = "\x1b[0;36m";
const RED_BOLD: &str = "\x1b[1;31m";
const NC: &str = "\x1b[0m";

static STDOUT_COLOR: LazyLock<bool> =
    LazyLock::new(|| color_allowed() && std::io::stdout().is_terminal());

static STDERR_COLOR: LazyLock<bool> =
    LazyLock::new(|| color_allowed() && std::io::stderr().is_terminal());

fn color_allowed() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

fn paint(color: &str, text: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{text}{NC}")
    } else {
        text.to_string()
    }
}

fn format_error(msg: &str, cause: Option<&dyn std::error::Error>, enabled: bool) -> String {
    match cause {
        Some(cause) => paint(RED_BOLD, &format!("{msg}\n{cause}"), enabled),
        None => paint(RED_BOLD, msg, enabled),
    }
}

/// Print a supervisor status line.
pub fn info(msg: &str) {
    println!("{}", paint(CYAN, msg, *STDOUT_COLOR));
}

/// Print an error line to stderr, followed by its cause when there is one.
pub fn error(msg: &str, cause: Option<&dyn std::error::Error>) {
    eprintln!("{}", format_error(msg, cause, *STDERR_COLOR));
}

/// Escape sequence that starts supervisor-colored text written directly to stdout.
pub fn countdown_color() -> &'static str {
    if *STDOUT_COLOR {
        CYAN
    } else {
        ""
    }
}

/// Reset sequence matching [`countdown_color`].
pub fn reset() -> &'static str {
    if *STDOUT_COLOR {
        NC
    } else {
        ""
    }
}
