//! Operational statistics

pub mod metrics;

pub use metrics::{PlaybackStats, ServerStats};
