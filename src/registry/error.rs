//! Registry error types

use thiserror::Error;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry was closed and accepts no new sessions
    #[error("server is shutting down")]
    Closed,
}
