//! SSH server tests with an in-memory session acceptor

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use ascii_movie::{
    Frame, Movie, MovieServer, ServerConfig, ServerState, Session, SessionAcceptor, SshServer,
    StreamRegistry, Transport, CLEAR_SCREEN,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Authenticated session over a duplex pipe
struct MemorySession {
    stream: DuplexStream,
    addr: SocketAddr,
    user: String,
}

impl AsyncRead for MemorySession {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemorySession {
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

impl Session for MemorySession {
    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    fn user(&self) -> Option<&str> {
        Some(&self.user)
    }
}

/// Acceptor fed by a channel; dropping the sender closes it
struct MemoryAcceptor {
    sessions: mpsc::Receiver<MemorySession>,
    shut_down: Arc<AtomicBool>,
}

impl SessionAcceptor for MemoryAcceptor {
    type Session = MemorySession;

    async fn accept(&mut self) -> io::Result<Option<MemorySession>> {
        Ok(self.sessions.recv().await)
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Dialer {
    sessions: mpsc::Sender<MemorySession>,
    shut_down: Arc<AtomicBool>,
}

impl Dialer {
    /// Open a session and return the client end
    async fn dial(&self, user: &str) -> DuplexStream {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = MemorySession {
            stream: server,
            addr: "198.51.100.20:40022".parse().unwrap(),
            user: user.to_string(),
        };
        self.sessions.send(session).await.unwrap();
        client
    }
}

fn acceptor() -> (MemoryAcceptor, Dialer) {
    let (tx, rx) = mpsc::channel(8);
    let shut_down = Arc::new(AtomicBool::new(false));
    let acceptor = MemoryAcceptor {
        sessions: rx,
        shut_down: Arc::clone(&shut_down),
    };
    let dialer = Dialer {
        sessions: tx,
        shut_down,
    };
    (acceptor, dialer)
}

fn movie(frames: usize, frame_time: Duration) -> Arc<Movie> {
    let frames = (0..frames)
        .map(|i| Frame::new(format!("<{i}>"), frame_time, ""))
        .collect();
    Arc::new(Movie::new(frames).unwrap())
}

fn config() -> ServerConfig {
    ServerConfig::default()
        .disable_telnet()
        .shutdown_grace(Duration::from_secs(10))
}

#[tokio::test(start_paused = true)]
async fn test_session_is_streamed_and_tracked() {
    let registry = Arc::new(StreamRegistry::new());
    let server = Arc::new(SshServer::new(
        config(),
        movie(3, Duration::from_secs(1)),
        Arc::clone(&registry),
    ));
    let (acceptor, dialer) = acceptor();
    let ctx = CancellationToken::new();

    let task = tokio::spawn({
        let server = Arc::clone(&server);
        let ctx = ctx.clone();
        async move { server.listen(ctx, acceptor).await }
    });

    let mut client = dialer.dial("alice").await;
    let mut stats = registry.subscribe();
    stats
        .wait_for(|s| s.streams(Transport::Ssh) == 1)
        .await
        .unwrap();
    assert_eq!(registry.snapshot().listeners(Transport::Ssh), 1);

    let mut output = String::new();
    client.read_to_string(&mut output).await.unwrap();
    assert_eq!(
        output,
        format!("{CLEAR_SCREEN}<0>{CLEAR_SCREEN}<1>{CLEAR_SCREEN}<2>")
    );

    registry.wait_drained(Some(Transport::Ssh)).await;
    assert_eq!(registry.snapshot().total_connections, 1);

    ctx.cancel();
    task.await.unwrap().unwrap();
    assert!(dialer.shut_down.load(Ordering::SeqCst));
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_closed_acceptor_stops_listener() {
    let registry = Arc::new(StreamRegistry::new());
    let server = SshServer::new(config(), movie(1, Duration::from_secs(1)), Arc::clone(&registry));
    let (acceptor, dialer) = acceptor();
    let shut_down = Arc::clone(&dialer.shut_down);
    drop(dialer);

    server
        .listen(CancellationToken::new(), acceptor)
        .await
        .unwrap();

    assert!(shut_down.load(Ordering::SeqCst));
    assert_eq!(registry.snapshot().listeners(Transport::Ssh), 0);
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_sessions() {
    let registry = Arc::new(StreamRegistry::new());
    let server = Arc::new(SshServer::new(
        config(),
        movie(2, Duration::from_secs(600)),
        Arc::clone(&registry),
    ));
    let (acceptor, dialer) = acceptor();
    let ctx = CancellationToken::new();

    let task = tokio::spawn({
        let server = Arc::clone(&server);
        let ctx = ctx.clone();
        async move { server.listen(ctx, acceptor).await }
    });

    let mut clients = Vec::new();
    for user in ["alice", "bob"] {
        clients.push(dialer.dial(user).await);
    }
    let mut stats = registry.subscribe();
    stats
        .wait_for(|s| s.streams(Transport::Ssh) == 2)
        .await
        .unwrap();

    ctx.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(registry.stream_count(), 0);
    for mut client in clients {
        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert_eq!(output, format!("{CLEAR_SCREEN}<0>"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_max_timeout_ends_session() {
    let registry = Arc::new(StreamRegistry::new());
    let config = config().max_timeout(Duration::from_secs(5));
    let server = Arc::new(SshServer::new(
        config,
        movie(10, Duration::from_secs(1)),
        Arc::clone(&registry),
    ));
    let (acceptor, dialer) = acceptor();
    let ctx = CancellationToken::new();

    let task = tokio::spawn({
        let server = Arc::clone(&server);
        let ctx = ctx.clone();
        async move { server.listen(ctx, acceptor).await }
    });

    let mut client = dialer.dial("carol").await;
    let mut output = String::new();
    client.read_to_string(&mut output).await.unwrap();

    // Cut off mid-movie
    let frames = output.matches(CLEAR_SCREEN).count();
    assert!((1..10).contains(&frames), "got {frames} frames");
    registry.wait_drained(Some(Transport::Ssh)).await;

    ctx.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_movie_server_runs_ssh_with_shared_registry() {
    let server = MovieServer::new(config(), movie(2, Duration::from_secs(1))).unwrap();
    let registry = Arc::clone(server.registry());
    let (acceptor, dialer) = acceptor();
    let ctx = CancellationToken::new();

    let task = tokio::spawn({
        let ctx = ctx.clone();
        async move { server.run(ctx, Some(acceptor)).await }
    });

    let mut client = dialer.dial("dave").await;
    let mut output = String::new();
    client.read_to_string(&mut output).await.unwrap();
    assert_eq!(output, format!("{CLEAR_SCREEN}<0>{CLEAR_SCREEN}<1>"));

    ctx.cancel();
    task.await.unwrap().unwrap();

    assert!(registry.is_closed().await);
    assert!(dialer.shut_down.load(Ordering::SeqCst));
}
