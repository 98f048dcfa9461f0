//! Interactive player
//!
//! Drives a [`Playback`] against an output stream. Whatever front-end owns
//! the user's input (key bindings, mouse zones) sends [`Control`] messages;
//! the player applies them on its own task so the cursor keeps a single
//! writer.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::playback::{Playback, Step};
use super::{log_outcome, Outcome};
use crate::error::{Error, Result};
use crate::movie::{Movie, CLEAR_SCREEN};
use crate::stats::PlaybackStats;

/// Request from a front-end
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    /// Change speed; a negative value rewinds
    SetSpeed(f64),
    Pause,
    Play,
}

/// Interactive player
pub struct Player<W> {
    playback: Playback,
    output: W,
    controls: mpsc::Receiver<Control>,
    stats: PlaybackStats,
    start: Instant,
}

impl<W: AsyncWrite + Unpin> Player<W> {
    pub fn new(movie: Arc<Movie>, output: W, controls: mpsc::Receiver<Control>) -> Self {
        Self {
            playback: Playback::new(movie),
            output,
            controls,
            stats: PlaybackStats::new(),
            start: Instant::now(),
        }
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_position(self.playback.frame(), self.playback.movie().last_index())
    }

    /// Current frame followed by its progress label
    pub fn view(&self) -> String {
        let frame = self.playback.current();
        format!("{}\n{}", frame.data, frame.progress)
    }

    /// Play until the movie ends, the output fails, or `cancel` fires
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.start = Instant::now();

        let result = self.run_inner(cancel).await;
        self.close();

        result
    }

    async fn run_inner(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.render().await?;

        let mut deadline = if self.playback.is_playing() {
            deadline_after(self.playback.initial_wait())
        } else {
            None
        };

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(Error::Cancelled),

                Some(control) = self.controls.recv() => {
                    let was_playing = self.playback.is_playing();
                    self.apply(control);

                    if !self.playback.is_playing() {
                        deadline = None;
                    } else if !was_playing {
                        // Resuming advances immediately
                        deadline = Some(Instant::now());
                    } else if deadline.is_none() {
                        // Stalled at zero speed
                        deadline = deadline_after(self.playback.initial_wait());
                    }
                }

                _ = sleep_until(deadline), if deadline.is_some() => {
                    let before = self.playback.frame();
                    match self.playback.advance() {
                        Step::Frame { wait, .. } => {
                            self.render().await?;
                            deadline = deadline_after(wait);
                        }
                        Step::Paused => {
                            if self.playback.frame() != before {
                                self.render().await?;
                            }
                            deadline = None;
                        }
                        Step::Done => {
                            // A collapse can land on the last frame
                            if self.playback.frame() != before {
                                self.render().await?;
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn apply(&mut self, control: Control) {
        tracing::debug!(?control, frame = self.playback.frame(), "Playback control");
        match control {
            Control::SetSpeed(speed) => self.playback.set_speed(speed),
            Control::Pause => self.playback.pause(),
            Control::Play => self.playback.play(),
        }
    }

    async fn render(&mut self) -> Result<()> {
        let view = self.view();
        self.output.write_all(CLEAR_SCREEN.as_bytes()).await?;
        self.output.write_all(view.as_bytes()).await?;
        self.output.flush().await?;
        self.stats.record_frame(CLEAR_SCREEN.len() + view.len());
        Ok(())
    }

    fn close(&mut self) {
        self.stats.duration = self.start.elapsed();
        self.playback.pause();
        log_outcome(self.outcome(), &self.stats);
    }
}

/// `None` when the wait is too long to schedule, as at speed zero
fn deadline_after(wait: Duration) -> Option<Instant> {
    Instant::now().checked_add(wait)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
