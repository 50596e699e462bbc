//! Error types for the embedded server.
//!
//! Startup failures are fatal and surfaced synchronously to the embedding
//! application. Background failures after startup (the delayed-stop timer,
//! working-directory removal) have no caller left to receive them; those are
//! logged via `tracing` and swallowed, and never appear in this enum.

use thiserror::Error;

/// Errors surfaced by the embedded server.
#[derive(Debug, Error)]
pub enum Error {
    /// `start()` was called on a controller that has already started.
    ///
    /// The running server's port and state are unaffected by the failed call.
    #[error("a server has already been started by this controller")]
    AlreadyStarted,

    /// An operation that requires a running server was invoked before
    /// `start()` (or after termination).
    #[error("the server has not been started")]
    NotStarted,

    /// The configured URL root is malformed. It must be empty, or start
    /// with `/` and not end with `/`.
    #[error("invalid URL root '{0}': must be empty, or start with '/' and not end with '/'")]
    InvalidUrlRoot(String),

    /// The underlying server failed to initialize.
    ///
    /// Covers working-directory creation and socket binding. Fatal to the
    /// caller of `start()`.
    #[error("failed to launch embedded server: {message}")]
    Launch {
        /// What was being attempted when the launch failed.
        message: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wraps an I/O error that occurred while launching the server.
    pub(crate) fn launch(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            message: message.into(),
            source,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
