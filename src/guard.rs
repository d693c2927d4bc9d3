/// Anti-recursion guard.
///
/// Every supervised child gets `wrapperutil=true` in its environment. A
/// supervisor that starts with the variable already set is running inside
/// another supervisor (or someone is poking at it) and refuses to start.
use std::fmt;

/// Name of the guard environment variable. Also the control-packet marker.
pub const NAME: &str = "wrapperutil";

/// Value the supervisor exports to its children.
pub const GUARD_VALUE: &str = "true";

/// Startup refusal caused by the guard variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    /// Invoked from a child of another supervisor.
    Nested,
    /// The variable holds something the supervisor never sets.
    Tampered(String),
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardViolation::Nested => write!(f, "You can't run WrapperUtil inside WrapperUtil..."),
            GuardViolation::Tampered(_) => write!(f, "Haha, very funny."),
        }
    }
}

impl std::error::Error for GuardViolation {}

/// Check a raw value of the guard variable. An unset or empty variable passes.
pub fn check(value: Option<&str>) -> Result<(), GuardViolation> {
    match value {
        None | Some("") => Ok(()),
        Some(GUARD_VALUE) => Err(GuardViolation::Nested),
        Some(other) => Err(GuardViolation::Tampered(other.to_string())),
    }
}

/// Check the guard variable of the current process.
pub fn check_env() -> Result<(), GuardViolation> {
    let value = std::env::var_os(NAME).map(|v| v.to_string_lossy().into_owned());
    check(value.as_deref())
}
