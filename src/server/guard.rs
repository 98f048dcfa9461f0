//! Connection guard
//!
//! Wraps a bidirectional stream with an idle timeout and an absolute max
//! timeout. A background watchdog owns both deadlines; when either passes it
//! cancels the session's token and fails all further I/O on the stream.
//! Successful reads and writes push the idle deadline back. The max deadline
//! never moves.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::Instrument;

/// Which limit closed the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    Idle,
    Max,
}

impl TimeoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutReason::Idle => "idle",
            TimeoutReason::Max => "max",
        }
    }
}

const REASON_NONE: u8 = 0;
const REASON_IDLE: u8 = 1;
const REASON_MAX: u8 = 2;

struct Shared {
    origin: Instant,
    idle_timeout: Duration,
    /// Nanoseconds from `origin` to the last successful read or write
    last_activity: AtomicU64,
    fired: AtomicBool,
    reason: AtomicU8,
    /// Cancelled by the watchdog; fails pending and future I/O
    expired: CancellationToken,
    /// Cancelled on close; stops the watchdog
    stop: CancellationToken,
    /// The session's token
    on_timeout: CancellationToken,
}

impl Shared {
    fn touch(&self) {
        let nanos = self.origin.elapsed().as_nanos() as u64;
        self.last_activity.store(nanos, Ordering::Release);
    }

    fn idle_deadline(&self) -> Option<Instant> {
        if self.idle_timeout.is_zero() {
            return None;
        }
        let last = Duration::from_nanos(self.last_activity.load(Ordering::Acquire));
        self.origin
            .checked_add(last)
            .and_then(|t| t.checked_add(self.idle_timeout))
    }

    /// Tear down at most once, whichever timer gets here first
    fn fire(&self, reason: TimeoutReason) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let code = match reason {
            TimeoutReason::Idle => REASON_IDLE,
            TimeoutReason::Max => REASON_MAX,
        };
        self.reason.store(code, Ordering::Release);

        tracing::debug!(
            reason = reason.as_str(),
            after = ?self.origin.elapsed(),
            "Connection timed out"
        );

        self.expired.cancel();
        self.on_timeout.cancel();
    }
}

/// A stream with idle and max timeouts
pub struct GuardedConn<S> {
    inner: S,
    shared: Arc<Shared>,
    expired: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<S> GuardedConn<S> {
    /// Wrap `inner`, arming both timers
    ///
    /// `on_timeout` is cancelled when either limit is exceeded. A zero
    /// duration disables that limit. Must be called within a tokio runtime.
    pub fn new(
        inner: S,
        idle_timeout: Duration,
        max_timeout: Duration,
        on_timeout: CancellationToken,
    ) -> Self {
        let origin = Instant::now();
        let expired = CancellationToken::new();

        let shared = Arc::new(Shared {
            origin,
            idle_timeout,
            last_activity: AtomicU64::new(0),
            fired: AtomicBool::new(false),
            reason: AtomicU8::new(REASON_NONE),
            expired: expired.clone(),
            stop: CancellationToken::new(),
            on_timeout,
        });

        let max_deadline = if max_timeout.is_zero() {
            None
        } else {
            origin.checked_add(max_timeout)
        };

        if max_deadline.is_some() || !idle_timeout.is_zero() {
            tokio::spawn(watchdog(Arc::clone(&shared), max_deadline).in_current_span());
        }

        Self {
            inner,
            shared,
            expired: Box::pin(expired.cancelled_owned()),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// The limit that closed this connection, if any
    pub fn timed_out(&self) -> Option<TimeoutReason> {
        match self.shared.reason.load(Ordering::Acquire) {
            REASON_IDLE => Some(TimeoutReason::Idle),
            REASON_MAX => Some(TimeoutReason::Max),
            _ => None,
        }
    }

    /// Stop both timers without touching the stream
    pub fn disarm(&self) {
        self.shared.stop.cancel();
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Option<io::Error> {
        if self.shared.expired.is_cancelled() || self.expired.as_mut().poll(cx).is_ready() {
            let reason = self.timed_out().map_or("closed", |r| r.as_str());
            return Some(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connection {reason} timeout"),
            ));
        }
        None
    }
}

impl<S: AsyncWrite + Unpin> GuardedConn<S> {
    /// Stop both timers and shut the stream down
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) -> io::Result<()> {
        self.disarm();
        self.inner.shutdown().await
    }
}

impl<S> Drop for GuardedConn<S> {
    fn drop(&mut self) {
        self.shared.stop.cancel();
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for GuardedConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = Pin::into_inner(self);
        if let Some(err) = this.poll_expired(cx) {
            return Poll::Ready(Err(err));
        }

        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(result, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.shared.touch();
        }
        result
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for GuardedConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = Pin::into_inner(self);
        if let Some(err) = this.poll_expired(cx) {
            return Poll::Ready(Err(err));
        }

        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &result {
            if *n > 0 {
                this.shared.touch();
            }
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = Pin::into_inner(self);
        if let Some(err) = this.poll_expired(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = Pin::into_inner(self);
        this.disarm();
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

async fn watchdog(shared: Arc<Shared>, max_deadline: Option<Instant>) {
    loop {
        let idle_deadline = shared.idle_deadline();

        tokio::select! {
            _ = shared.stop.cancelled() => return,
            _ = sleep_until(max_deadline), if max_deadline.is_some() => {
                shared.fire(TimeoutReason::Max);
                return;
            }
            _ = sleep_until(idle_deadline), if idle_deadline.is_some() => {
                // Activity may have moved the deadline while we slept
                if shared.idle_deadline().is_some_and(|d| d <= Instant::now()) {
                    shared.fire(TimeoutReason::Idle);
                    return;
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
