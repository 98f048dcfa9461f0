//! Movie players
//!
//! - [`Playback`]: the speed/direction state machine with frame collapsing
//! - [`SimplePlayer`]: fixed-speed streaming used by remote sessions
//! - [`Player`]: interactive playback driven by [`Control`] messages

pub mod interactive;
pub mod playback;
pub mod simple;

pub use interactive::{Control, Player};
pub use playback::{Cursor, Playback, Step, MIN_FRAME_TIME};
pub use simple::SimplePlayer;

use std::time::Duration;

use crate::stats::PlaybackStats;

/// How a session's playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The cursor reached the last frame
    Finished,
    /// The session ended before the last frame
    DisconnectedEarly,
}

impl Outcome {
    pub(crate) fn from_position(frame: usize, last_index: usize) -> Self {
        if frame >= last_index {
            Outcome::Finished
        } else {
            Outcome::DisconnectedEarly
        }
    }
}

/// Round a played duration down to 100ms for logging
pub(crate) fn played(duration: Duration) -> Duration {
    const STEP: u128 = 100_000_000;
    let nanos = duration.as_nanos() / STEP * STEP;
    Duration::from_nanos(nanos as u64)
}

pub(crate) fn log_outcome(outcome: Outcome, stats: &PlaybackStats) {
    let duration = played(stats.duration);
    match outcome {
        Outcome::Finished => tracing::info!(
            duration = ?duration,
            frames = stats.frames_written,
            "Finished movie"
        ),
        Outcome::DisconnectedEarly => tracing::info!(
            duration = ?duration,
            frames = stats.frames_written,
            "Disconnected early"
        ),
    }
}
