//! SSH server
//!
//! Key exchange, authentication and channel multiplexing belong to the SSH
//! library. It hands this server finished sessions through a
//! [`SessionAcceptor`]; from there each session is guarded, registered and
//! played exactly like a telnet connection.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::config::ServerConfig;
use super::guard::GuardedConn;
use super::handler::{session_span, MoviePlayback, Session, SessionHandler, TrackStream};
use super::{drain, ServerState};
use crate::error::{Error, Result};
use crate::movie::Movie;
use crate::registry::{StreamRegistry, Transport};

/// Source of authenticated SSH sessions
///
/// Implemented on top of the SSH library's server. The acceptor is bound
/// before it is handed to [`SshServer::listen`].
pub trait SessionAcceptor: Send {
    type Session: Session;

    /// Wait for the next session
    ///
    /// `Ok(None)` means the underlying server has closed and no more
    /// sessions will arrive. Must be cancel safe: shutdown drops a pending
    /// `accept` future.
    fn accept(&mut self) -> impl Future<Output = io::Result<Option<Self::Session>>> + Send;

    /// Stop the underlying server
    fn shutdown(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// SSH movie server
pub struct SshServer<H = TrackStream<MoviePlayback>> {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    handler: Arc<H>,
    state: watch::Sender<ServerState>,
}

impl SshServer {
    /// Create a server that streams `movie` to every session
    pub fn new(config: ServerConfig, movie: Arc<Movie>, registry: Arc<StreamRegistry>) -> Self {
        let playback = MoviePlayback::new(movie, config.speed);
        let handler = TrackStream::new(playback, Arc::clone(&registry), Transport::Ssh);
        Self::with_handler(config, registry, handler)
    }
}

impl<H> SshServer<H> {
    /// Create a server with a custom handler chain
    pub fn with_handler(config: ServerConfig, registry: Arc<StreamRegistry>, handler: H) -> Self {
        let (state, _) = watch::channel(ServerState::Created);

        Self {
            config,
            registry,
            handler: Arc::new(handler),
            state,
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Serve sessions from `acceptor` until `ctx` is cancelled
    ///
    /// Shutdown waits up to the grace period for SSH sessions to leave the
    /// registry, then stops the acceptor. A failure to stop it is returned.
    pub async fn listen<A>(&self, ctx: CancellationToken, mut acceptor: A) -> Result<()>
    where
        A: SessionAcceptor,
        H: SessionHandler<GuardedConn<A::Session>>,
    {
        tracing::info!(address = %self.config.ssh.address, "Starting SSH server");

        let tracker = TaskTracker::new();
        self.registry.listener_started(Transport::Ssh).await;
        self.state.send_replace(ServerState::Listening);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                accepted = acceptor.accept() => match accepted {
                    Ok(Some(session)) => self.handle_session(&tracker, &ctx, session),
                    Ok(None) => {
                        tracing::debug!("SSH session acceptor closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        self.registry.listener_stopped(Transport::Ssh).await;
        self.state.send_replace(ServerState::ShuttingDown);
        tracing::info!("Stopping SSH server");

        tracker.close();
        let registry = Arc::clone(&self.registry);
        drain(self.config.shutdown_grace, Transport::Ssh, async move {
            tracker.wait().await;
            registry.wait_drained(Some(Transport::Ssh)).await;
        })
        .await;

        let result = acceptor.shutdown().await.map_err(Error::Shutdown);

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("Stopped SSH server");
        result
    }

    fn handle_session<S>(&self, tracker: &TaskTracker, ctx: &CancellationToken, session: S)
    where
        S: Session,
        H: SessionHandler<GuardedConn<S>>,
    {
        let span = session_span(Transport::Ssh, &session);

        let token = ctx.child_token();
        let conn = span.in_scope(|| {
            GuardedConn::new(
                session,
                self.config.idle_timeout,
                self.config.max_timeout,
                token.clone(),
            )
        });

        let handler = Arc::clone(&self.handler);
        tracker.spawn(async move { handler.handle(conn, token).await }.instrument(span));
    }
}
