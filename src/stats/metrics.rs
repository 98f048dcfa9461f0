//! Statistics for streaming sessions and servers

use std::time::Duration;

use crate::registry::Transport;

/// Per-session playback statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Frames fully written to the client
    pub frames_written: u64,
    /// Total bytes written, clear sequences included
    pub bytes_written: u64,
    /// Wall time since playback started
    pub duration: Duration,
}

impl PlaybackStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame written to the output
    pub fn record_frame(&mut self, bytes: usize) {
        self.frames_written += 1;
        self.bytes_written += bytes as u64;
    }
}

/// Server-wide counts, as published by the stream registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Live SSH sessions
    pub ssh_streams: usize,
    /// Live telnet sessions
    pub telnet_streams: usize,
    /// SSH listeners currently accepting
    pub ssh_listeners: usize,
    /// Telnet listeners currently accepting
    pub telnet_listeners: usize,
    /// Sessions registered since startup
    pub total_connections: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live sessions across all transports
    pub fn active_streams(&self) -> usize {
        self.ssh_streams + self.telnet_streams
    }

    /// Live sessions for one transport
    pub fn streams(&self, transport: Transport) -> usize {
        match transport {
            Transport::Ssh => self.ssh_streams,
            Transport::Telnet => self.telnet_streams,
        }
    }

    /// Running listeners for one transport
    pub fn listeners(&self, transport: Transport) -> usize {
        match transport {
            Transport::Ssh => self.ssh_listeners,
            Transport::Telnet => self.telnet_listeners,
        }
    }

    pub(crate) fn streams_mut(&mut self, transport: Transport) -> &mut usize {
        match transport {
            Transport::Ssh => &mut self.ssh_streams,
            Transport::Telnet => &mut self.telnet_streams,
        }
    }

    pub(crate) fn listeners_mut(&mut self, transport: Transport) -> &mut usize {
        match transport {
            Transport::Ssh => &mut self.ssh_listeners,
            Transport::Telnet => &mut self.telnet_listeners,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_stats_record_frame() {
        let mut stats = PlaybackStats::new();
        stats.record_frame(100);
        stats.record_frame(50);

        assert_eq!(stats.frames_written, 2);
        assert_eq!(stats.bytes_written, 150);
    }

    #[test]
    fn test_server_stats_new() {
        let stats = ServerStats::new();
        assert_eq!(stats.active_streams(), 0);
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.listeners(Transport::Ssh), 0);
        assert_eq!(stats.listeners(Transport::Telnet), 0);
    }

    #[test]
    fn test_server_stats_per_transport() {
        let mut stats = ServerStats::new();
        *stats.streams_mut(Transport::Ssh) += 3;
        *stats.streams_mut(Transport::Telnet) += 2;
        *stats.listeners_mut(Transport::Telnet) += 1;

        assert_eq!(stats.streams(Transport::Ssh), 3);
        assert_eq!(stats.streams(Transport::Telnet), 2);
        assert_eq!(stats.active_streams(), 5);
        assert_eq!(stats.listeners(Transport::Telnet), 1);
        assert_eq!(stats.listeners(Transport::Ssh), 0);
    }
}
