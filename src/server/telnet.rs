//! Telnet server
//!
//! Owns its TCP accept loop. There is no telnet option negotiation: clients
//! receive terminal escape sequences over the plain socket.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
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

/// An accepted TCP connection
pub struct TcpSession {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl TcpSession {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self { stream, peer_addr }
    }
}

impl AsyncRead for TcpSession {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpSession {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl Session for TcpSession {
    fn remote_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// Raw TCP movie server
pub struct TelnetServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    handler: Arc<TrackStream<MoviePlayback>>,
    state: watch::Sender<ServerState>,
}

impl TelnetServer {
    pub fn new(config: ServerConfig, movie: Arc<Movie>, registry: Arc<StreamRegistry>) -> Self {
        let playback = MoviePlayback::new(movie, config.speed);
        let handler = TrackStream::new(playback, Arc::clone(&registry), Transport::Telnet);
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

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.telnet.address;
        TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })
    }

    /// Bind and serve until `ctx` is cancelled
    pub async fn listen(&self, ctx: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, ctx).await
    }

    /// Serve on an already bound listener until `ctx` is cancelled
    ///
    /// On cancellation the accept loop stops and the listener closes. Every
    /// session's token is cancelled and the server waits up to the shutdown
    /// grace period for sessions to finish.
    pub async fn serve(&self, listener: TcpListener, ctx: CancellationToken) -> Result<()> {
        let addr = listener.local_addr().ok();
        tracing::info!(address = ?addr, "Starting telnet server");

        let tracker = TaskTracker::new();
        self.registry.listener_started(Transport::Telnet).await;
        self.state.send_replace(ServerState::Listening);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.handle_connection(&tracker, &ctx, socket, peer_addr),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        // Refuse new connections while sessions drain
        drop(listener);
        self.registry.listener_stopped(Transport::Telnet).await;
        self.state.send_replace(ServerState::ShuttingDown);
        tracing::info!("Stopping telnet server");

        tracker.close();
        drain(self.config.shutdown_grace, Transport::Telnet, tracker.wait()).await;

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("Stopped telnet server");
        Ok(())
    }

    fn handle_connection(
        &self,
        tracker: &TaskTracker,
        ctx: &CancellationToken,
        socket: TcpStream,
        peer_addr: SocketAddr,
    ) {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::warn!(peer = %peer_addr, error = %e, "Failed to configure socket");
        }

        let session = TcpSession::new(socket, peer_addr);
        let span = session_span(Transport::Telnet, &session);

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
