//! Frame sequence
//!
//! A `Movie` is loaded once and shared read-only (behind an `Arc`) by every
//! session. Parsing the on-disk asset happens elsewhere; this module only
//! holds the already-rendered frames.

pub mod frame;

pub use frame::{Frame, CLEAR_SCREEN};

use std::time::Duration;

use unicode_width::UnicodeWidthStr;

use crate::error::{Error, Result};

/// An ordered, non-empty list of frames
#[derive(Debug, Clone)]
pub struct Movie {
    frames: Vec<Frame>,
    width: usize,
}

impl Movie {
    /// Create a movie from its frames
    ///
    /// Returns `Error::EmptyMovie` if `frames` is empty.
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::EmptyMovie);
        }

        let width = frames
            .iter()
            .flat_map(|f| f.data.lines())
            .map(UnicodeWidthStr::width)
            .max()
            .unwrap_or(0);

        Ok(Self { frames, width })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Get a frame by index
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Number of frames (never zero)
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the final frame
    pub fn last_index(&self) -> usize {
        self.frames.len() - 1
    }

    /// Display width of the widest frame line, in terminal columns
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total play time at the given speed
    pub fn total_duration(&self, speed: f64) -> Duration {
        self.frames
            .iter()
            .fold(Duration::ZERO, |acc, f| acc.saturating_add(f.calc_duration(speed)))
    }
}
