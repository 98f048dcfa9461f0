//! Crate error types
//!
//! Per-session failures are logged and contained inside the session task.
//! Only bind and shutdown failures surface from a server's `listen`.

use std::net::SocketAddr;

use thiserror::Error;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for movie streaming
#[derive(Debug, Error)]
pub enum Error {
    /// A listener could not be started
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The stream registry refused a new session
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Writing to a client failed
    #[error("playback i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Playback was interrupted by shutdown or a connection timeout
    #[error("playback cancelled")]
    Cancelled,

    /// A movie must have at least one frame
    #[error("movie has no frames")]
    EmptyMovie,

    /// Configuration rejected by `ServerConfig::validate`
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Closing a listener or session acceptor failed
    #[error("failed to stop server: {0}")]
    Shutdown(#[source] std::io::Error),

    /// A server task panicked or was aborted
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether this error only signals cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Render the single line shown to a client before its connection is closed
pub fn error_text(err: &Error) -> String {
    match err {
        Error::Registry(e) => format!("Error: {e}. Please try again later."),
        other => format!("Error: {other}"),
    }
}
