//! Session handlers
//!
//! A handler serves one accepted session. Handlers compose: [`TrackStream`]
//! wraps any handler with stream registry bookkeeping, the same way the SSH
//! library's middleware chain wraps its session handler.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::guard::GuardedConn;
use crate::error::{error_text, Error};
use crate::movie::Movie;
use crate::player::SimplePlayer;
use crate::registry::{StreamRegistry, Transport};

/// A connected client stream
pub trait Session: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Address of the remote peer
    fn remote_addr(&self) -> SocketAddr;

    /// Authenticated user name, for transports that have one
    fn user(&self) -> Option<&str> {
        None
    }
}

impl<S: Session> Session for GuardedConn<S> {
    fn remote_addr(&self) -> SocketAddr {
        self.get_ref().remote_addr()
    }

    fn user(&self) -> Option<&str> {
        self.get_ref().user()
    }
}

/// Serves one session until it ends
///
/// `ctx` is the session's own token: cancelled on shutdown or when the
/// connection guard times the session out.
pub trait SessionHandler<S>: Send + Sync + 'static {
    fn handle(&self, session: S, ctx: CancellationToken) -> impl Future<Output = ()> + Send;
}

/// Remote IP without the port
pub fn remote_ip(addr: SocketAddr) -> String {
    addr.ip().to_string()
}

/// Span carrying the fields every event of a session is logged with
pub(crate) fn session_span<S: Session>(transport: Transport, session: &S) -> tracing::Span {
    tracing::info_span!(
        "stream",
        transport = %transport,
        remote_ip = %remote_ip(session.remote_addr()),
        user = session.user().unwrap_or_default(),
    )
}

/// Streams the movie to the session at a fixed speed
pub struct MoviePlayback {
    movie: Arc<Movie>,
    speed: f64,
}

impl MoviePlayback {
    pub fn new(movie: Arc<Movie>, speed: f64) -> Self {
        Self { movie, speed }
    }
}

impl<S: Session> SessionHandler<S> for MoviePlayback {
    async fn handle(&self, mut session: S, ctx: CancellationToken) {
        let mut player = SimplePlayer::new(Arc::clone(&self.movie), &mut session).with_speed(self.speed);

        if let Err(err) = player.play(&ctx).await {
            // A guard timeout can surface as a failed write before the
            // cancellation is observed.
            if !err.is_cancelled() && !ctx.is_cancelled() {
                tracing::error!(error = %err, "Movie playback failed");
            }
        }

        let _ = session.shutdown().await;
    }
}

/// Registers the session in the stream registry around the inner handler
///
/// A session the registry refuses gets one line of explanation and is
/// closed without reaching the inner handler.
pub struct TrackStream<H> {
    inner: H,
    registry: Arc<StreamRegistry>,
    transport: Transport,
}

impl<H> TrackStream<H> {
    pub fn new(inner: H, registry: Arc<StreamRegistry>, transport: Transport) -> Self {
        Self {
            inner,
            registry,
            transport,
        }
    }
}

impl<S: Session, H: SessionHandler<S>> SessionHandler<S> for TrackStream<H> {
    async fn handle(&self, mut session: S, ctx: CancellationToken) {
        let ip = remote_ip(session.remote_addr());

        let id = match self.registry.connect(self.transport, ip).await {
            Ok(id) => id,
            Err(e) => {
                let err = Error::from(e);
                tracing::error!(error = %err, "Failed to begin stream");

                let line = format!("{}\n", error_text(&err));
                let _ = session.write_all(line.as_bytes()).await;
                let _ = session.shutdown().await;
                return;
            }
        };

        tracing::info!(session_id = id, "Stream started");
        self.inner.handle(session, ctx).await;
        self.registry.disconnect(id).await;
    }
}
