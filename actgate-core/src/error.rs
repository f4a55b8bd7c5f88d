//! # Error Taxonomy
//!
//! Every error surfaced by the cache or the invoker maps onto one of a handful of kinds, so
//! outer layers (HTTP, CLI) can decide between "client error", "server error" and
//! "called, but rejected" without matching on every module's error enum.
use std::fmt;

/// The coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown producing component, service or method. Never retried.
    NotFound,
    /// Malformed service key or a payload that does not match the target schema.
    InvalidInput,
    /// The schema compiler failed or a dependency could not be resolved.
    Compilation,
    /// Connection failure, stream reset or deadline exceeded.
    Transport,
    /// The call went through, but the response carries a failure status.
    Application,
}

impl ErrorKind {
    /// Whether the failure is the caller's fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::NotFound | ErrorKind::InvalidInput)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Compilation => "compilation error",
            ErrorKind::Transport => "transport error",
            ErrorKind::Application => "application error",
        };
        f.write_str(name)
    }
}
