//! Stream ASCII movies to terminal clients over SSH and telnet
//!
//! A [`Movie`] is an ordered list of [`Frame`]s, each shown for its own
//! duration. Every connected client gets an independent playback of the
//! same shared movie:
//!
//! - [`SimplePlayer`] plays start to finish at a fixed speed.
//! - [`Player`] adds speed, direction and pause control.
//!
//! [`MovieServer`] runs the telnet and SSH listeners side by side, with
//! per-connection idle and max timeouts, a shared [`StreamRegistry`] of
//! active streams, and graceful shutdown on cancellation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ascii_movie::{Frame, Movie, ServerConfig, TelnetServer, StreamRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> ascii_movie::Result<()> {
//! let movie = Movie::new(vec![
//!     Frame::new("o", Duration::from_millis(500), "[#   ]"),
//!     Frame::new("O", Duration::from_millis(500), "[####]"),
//! ])?;
//!
//! let config = ServerConfig::default().disable_ssh();
//! let server = TelnetServer::new(config, Arc::new(movie), Arc::new(StreamRegistry::new()));
//! server.listen(CancellationToken::new()).await
//! # }
//! ```

pub mod error;
pub mod movie;
pub mod player;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{error_text, Error, Result};
pub use movie::{Frame, Movie, CLEAR_SCREEN};
pub use player::{Control, Outcome, Playback, Player, SimplePlayer, MIN_FRAME_TIME};
pub use registry::{RegistryError, StreamEntry, StreamRegistry, Transport};
pub use server::{
    GuardedConn, MovieServer, ServerConfig, ServerState, Session, SessionAcceptor,
    SessionHandler, SshServer, TelnetServer,
};
pub use stats::{PlaybackStats, ServerStats};
