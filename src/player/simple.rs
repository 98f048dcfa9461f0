//! Streaming player
//!
//! Fixed-speed, forward-only playback used for remote sessions. Every frame
//! is written as a clear-screen sequence followed by its content, then the
//! player waits out the frame's duration or the cancellation, whichever
//! comes first.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{log_outcome, Outcome};
use crate::error::{Error, Result};
use crate::movie::Movie;
use crate::stats::PlaybackStats;

/// Non-interactive player writing to any async output
pub struct SimplePlayer<W> {
    movie: Arc<Movie>,
    frame: usize,
    speed: f64,
    start: Instant,
    output: W,
    stats: PlaybackStats,
}

impl<W: AsyncWrite + Unpin> SimplePlayer<W> {
    /// Create a player at speed 1
    pub fn new(movie: Arc<Movie>, output: W) -> Self {
        Self {
            movie,
            frame: 0,
            speed: 1.0,
            start: Instant::now(),
            output,
            stats: PlaybackStats::new(),
        }
    }

    /// Set the playback speed multiplier
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Index of the frame being shown
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    /// Whether the session got to the end of the movie
    pub fn outcome(&self) -> Outcome {
        Outcome::from_position(self.frame, self.movie.last_index())
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    /// Play the movie from the start
    ///
    /// Returns `Error::Cancelled` if `cancel` fires first, or the write
    /// error if the output fails. The outcome is logged either way.
    pub async fn play(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.frame = 0;
        self.start = Instant::now();

        let result = self.run(cancel).await;

        self.stats.duration = self.start.elapsed();
        log_outcome(self.outcome(), &self.stats);

        result
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        while self.frame < self.movie.len() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let frame = &self.movie.frames()[self.frame];
            let packet = frame.packet().clone();
            let duration = frame.calc_duration(self.speed);

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                written = write_frame(&mut self.output, &packet) => written?,
            }
            self.stats.record_frame(packet.len());

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(duration) => {}
            }

            self.frame += 1;
        }

        Ok(())
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(output: &mut W, packet: &[u8]) -> std::io::Result<()> {
    output.write_all(packet).await?;
    output.flush().await
}
