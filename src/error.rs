//! Error types for the observation core.
//!
//! Configuration errors (duplicate view ids, unsupported mutation kinds)
//! fail the calling operation and are never retried. Connection errors are
//! handled locally by the broadcast actor and never surface here.

use thiserror::Error;

/// Errors raised by the tracker and session facade
#[derive(Debug, Error)]
pub enum Error {
    #[error("view `{0}` is already registered")]
    DuplicateView(String),

    #[error("view `{0}` is not registered")]
    UnknownView(String),

    /// Structural mutations other than setValue/listAppend are programmer
    /// error and fail fast rather than silently skipping tracking.
    #[error("unsupported mutation: {0}")]
    UnsupportedMutation(String),

    #[error("expected a {expected} node, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
