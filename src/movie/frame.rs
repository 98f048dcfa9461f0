//! Movie frame
//!
//! A frame is one pre-rendered text block plus how long it stays on screen.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

/// Clear the screen and move the cursor to the top-left corner
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[999;1H";

/// A single movie frame
///
/// Cheap to clone: the encoded packet is reference counted and shared by
/// every session streaming the movie.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Rendered frame content
    pub data: String,
    /// Nominal display duration at speed 1
    pub duration: Duration,
    /// Progress indicator shown under the frame
    pub progress: String,
    /// Clear sequence followed by `data`, encoded once
    packet: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(data: impl Into<String>, duration: Duration, progress: impl Into<String>) -> Self {
        let data = data.into();

        let mut packet = BytesMut::with_capacity(CLEAR_SCREEN.len() + data.len());
        packet.put_slice(CLEAR_SCREEN.as_bytes());
        packet.put_slice(data.as_bytes());

        Self {
            data,
            duration,
            progress: progress.into(),
            packet: packet.freeze(),
        }
    }

    /// Bytes written to a streaming client for this frame
    pub fn packet(&self) -> &Bytes {
        &self.packet
    }

    /// Display duration at the given speed multiplier
    ///
    /// Returns `Duration::MAX` for a zero, negative, or non-finite speed.
    pub fn calc_duration(&self, speed: f64) -> Duration {
        if !speed.is_finite() || speed <= 0.0 {
            return Duration::MAX;
        }
        let nanos = (self.duration.as_nanos() as f64 / speed).round();
        if nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos as u64)
    }
}
