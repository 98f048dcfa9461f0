//! Movie streaming servers
//!
//! Both transports share one shape: an accept loop hands each connection
//! to a spawned session task, which guards it with idle/max timeouts,
//! registers it and plays the movie. Cancellation flows down a token tree:
//!
//! ```text
//! process ─► MovieServer group ─► listener (ssh | telnet) ─► session
//! ```
//!
//! Cancelling any level cancels everything below it.

pub mod config;
pub mod guard;
pub mod handler;
pub mod ssh;
pub mod telnet;

pub use config::{ServerConfig, TransportConfig};
pub use guard::{GuardedConn, TimeoutReason};
pub use handler::{remote_ip, MoviePlayback, Session, SessionHandler, TrackStream};
pub use ssh::{SessionAcceptor, SshServer};
pub use telnet::{TcpSession, TelnetServer};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::movie::Movie;
use crate::registry::{StreamRegistry, Transport};

/// Server lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not yet accepting
    Created,
    /// Accepting connections
    Listening,
    /// Accept loop stopped, waiting for sessions to finish
    ShuttingDown,
    /// All sessions finished or the grace period ran out
    Stopped,
}

/// Wait for in-flight sessions, giving up after `grace`
///
/// Returns `false` if sessions were still running when the grace period
/// ran out.
pub(crate) async fn drain<F>(grace: Duration, transport: Transport, sessions_done: F) -> bool
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(grace, sessions_done).await {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(
                transport = %transport,
                grace_secs = grace.as_secs_f64(),
                "Shutdown grace period elapsed, closing anyway"
            );
            false
        }
    }
}

/// Runs every enabled transport against one registry
pub struct MovieServer {
    config: ServerConfig,
    movie: Arc<Movie>,
    registry: Arc<StreamRegistry>,
}

impl MovieServer {
    /// Create a server, rejecting invalid configuration
    pub fn new(config: ServerConfig, movie: Arc<Movie>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            movie,
            registry: Arc::new(StreamRegistry::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared registry, for health and metrics output
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Serve until `ctx` is cancelled or a listener fails
    ///
    /// The first listener error cancels the others and is returned once
    /// they have all stopped. `ssh` is required when SSH is enabled.
    pub async fn run<A>(&self, ctx: CancellationToken, ssh: Option<A>) -> Result<()>
    where
        A: SessionAcceptor + 'static,
    {
        let group = ctx.child_token();
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        if self.config.ssh.enabled {
            let Some(acceptor) = ssh else {
                return Err(Error::Config(
                    "ssh is enabled but no session acceptor was provided".into(),
                ));
            };
            let server = SshServer::new(
                self.config.clone(),
                Arc::clone(&self.movie),
                Arc::clone(&self.registry),
            );
            let token = group.child_token();
            tasks.spawn(async move { server.listen(token, acceptor).await });
        } else if ssh.is_some() {
            tracing::debug!("SSH disabled, ignoring session acceptor");
        }

        if self.config.telnet.enabled {
            let server = TelnetServer::new(
                self.config.clone(),
                Arc::clone(&self.movie),
                Arc::clone(&self.registry),
            );
            let token = group.child_token();
            tasks.spawn(async move { server.listen(token).await });
        }

        // Refuse new sessions as soon as shutdown begins
        let registry = Arc::clone(&self.registry);
        let closer = group.clone();
        tasks.spawn(async move {
            closer.cancelled().await;
            registry.close().await;
            Ok(())
        });

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(Error::from).and_then(|r| r);
            if let Err(err) = result {
                tracing::error!(error = %err, "Server failed");
                group.cancel();
                first_error.get_or_insert(err);
            }

            // Only the registry closer left: every listener has stopped
            if tasks.len() == 1 && !group.is_cancelled() {
                group.cancel();
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
