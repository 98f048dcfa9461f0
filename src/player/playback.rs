//! Playback state machine
//!
//! Advances a cursor through a movie at a variable, signed speed. Frames that
//! would be shown for less than [`MIN_FRAME_TIME`] are merged into the next
//! one, so fast-forward and rewind skip visually redundant frames while the
//! cumulative wait still matches the requested speed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::movie::{Frame, Movie};

/// Shortest wait ever emitted by [`Playback::advance`] (15 frames per second)
pub const MIN_FRAME_TIME: Duration = Duration::from_nanos(1_000_000_000 / 15);

/// Result of one [`Playback::advance`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Show the frame at `index`, then wait `wait` before advancing again
    Frame { index: usize, wait: Duration },
    /// Playback is halted; nothing advances until [`Playback::play`]
    Paused,
    /// Forward playback ran past the last frame
    Done,
}

/// Per-session playback position
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Index of the frame on screen
    pub frame: usize,
    /// Rate multiplier; negative plays in reverse
    pub speed: f64,
    pub started_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Playback engine for one session
///
/// Owned by a single task. Front-ends change speed or pause through
/// `&mut self` methods on that task rather than by sharing the cursor.
#[derive(Debug)]
pub struct Playback {
    movie: Arc<Movie>,
    cursor: Cursor,
    playing: bool,
}

impl Playback {
    /// Start at the first frame, playing forward at speed 1
    pub fn new(movie: Arc<Movie>) -> Self {
        Self {
            movie,
            cursor: Cursor {
                frame: 0,
                speed: 1.0,
                started_at: Instant::now(),
            },
            playing: true,
        }
    }

    /// Set the initial speed
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.cursor.speed = speed;
        self
    }

    /// Set the initial frame, clamped to the movie
    pub fn at_frame(mut self, frame: usize) -> Self {
        self.cursor.frame = frame.min(self.movie.last_index());
        self
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Index of the frame on screen
    pub fn frame(&self) -> usize {
        self.cursor.frame
    }

    /// The frame on screen
    pub fn current(&self) -> &Frame {
        &self.movie.frames()[self.cursor.frame]
    }

    pub fn movie(&self) -> &Arc<Movie> {
        &self.movie
    }

    pub fn speed(&self) -> f64 {
        self.cursor.speed
    }

    /// Change speed and direction
    pub fn set_speed(&mut self, speed: f64) {
        self.cursor.speed = speed;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Stop advancing
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Resume advancing
    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Whether the cursor sits on the last frame
    pub fn is_at_end(&self) -> bool {
        self.cursor.frame >= self.movie.last_index()
    }

    /// How long the current frame stays up before the first `advance`
    pub fn initial_wait(&self) -> Duration {
        self.current().calc_duration(self.cursor.speed.abs())
    }

    /// Move to the next frame to display
    ///
    /// Reaching the first frame while rewinding resets the speed to 1 and
    /// pauses. Running past the last frame while playing forward is `Done`.
    pub fn advance(&mut self) -> Step {
        if !self.playing {
            return Step::Paused;
        }

        let direction = if self.cursor.speed >= 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        let speed = self.cursor.speed.abs();

        if let Some(stop) = self.step(direction) {
            return stop;
        }
        let mut wait = self.current().calc_duration(speed);

        while wait < MIN_FRAME_TIME {
            if let Some(stop) = self.step(direction) {
                return stop;
            }
            wait = wait.saturating_add(self.current().calc_duration(speed));
        }

        Step::Frame {
            index: self.cursor.frame,
            wait,
        }
    }

    /// Move the cursor one frame, or return the terminal step if it can't
    fn step(&mut self, direction: Direction) -> Option<Step> {
        match direction {
            Direction::Forward => {
                if self.is_at_end() {
                    return Some(Step::Done);
                }
                self.cursor.frame += 1;
            }
            Direction::Reverse => {
                if self.cursor.frame == 0 {
                    self.cursor.speed = 1.0;
                    self.pause();
                    return Some(Step::Paused);
                }
                self.cursor.frame -= 1;
            }
        }
        None
    }
}
