use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Optional settings loaded from a TOML file passed with `--config`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub restart: RestartTimeouts,
}

/// Countdown lengths, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RestartTimeouts {
    #[serde(rename = "timeout_secs")]
    pub normal_secs: u64,
    #[serde(rename = "short_timeout_secs")]
    pub short_secs: u64,
}

impl Default for RestartTimeouts {
    fn default() -> Self {
        Self {
            normal_secs: 10,
            short_secs: 3,
        }
    }
}

/// Failure to read or parse the settings file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Settings::parse(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn parse(text: &str) -> Result<Settings, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Everything one supervisor invocation needs, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub auto_restart: bool,
    pub short_timeout: bool,
    pub measure_time: bool,
    pub packets_enabled: bool,
    /// argv of the child; never empty.
    pub command: Vec<String>,
    pub timeouts: RestartTimeouts,
}

/// Fatal problems detected before anything is run.
#[derive(Debug)]
pub enum StartupError {
    NoCommand,
    Guard(crate::guard::GuardViolation),
    Config(ConfigError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::NoCommand => write!(f, "No command given. Run with --help for help"),
            StartupError::Guard(violation) => write!(f, "{violation}"),
            StartupError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::NoCommand => None,
            StartupError::Guard(violation) => Some(violation),
            StartupError::Config(e) => Some(e),
        }
    }
}

impl From<crate::guard::GuardViolation> for StartupError {
    fn from(violation: crate::guard::GuardViolation) -> Self {
        StartupError::Guard(violation)
    }
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

/// Flags and command as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    pub restart: bool,
    pub shorter: bool,
    pub timer: bool,
    pub packets: bool,
    pub config: Option<PathBuf>,
    pub command: Vec<String>,
}

impl RunConfiguration {
    /// Validate the flags and merge in the settings file, if any.
    pub fn build(flags: Flags) -> Result<RunConfiguration, StartupError> {
        if flags.command.is_empty() {
            return Err(StartupError::NoCommand);
        }

        let settings = match &flags.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        Ok(RunConfiguration {
            auto_restart: flags.restart,
            short_timeout: flags.shorter,
            measure_time: flags.timer,
            packets_enabled: flags.packets,
            command: flags.command,
            timeouts: settings.restart,
        })
    }
}
