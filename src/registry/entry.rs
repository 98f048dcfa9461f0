//! Stream entry types
//!
//! This module defines the per-session record stored in the registry.

use std::fmt;
use std::time::{Duration, Instant};

/// Transport a session arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// SSH session, handshake handled by the SSH library
    Ssh,
    /// Plain TCP socket
    Telnet,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Ssh => "ssh",
            Transport::Telnet => "telnet",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry for a single live session
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Unique for the registry's lifetime
    pub id: u64,
    pub transport: Transport,
    /// Remote IP, without port
    pub remote_addr: String,
    pub connected_at: Instant,
}

impl StreamEntry {
    pub(super) fn new(id: u64, transport: Transport, remote_addr: String) -> Self {
        Self {
            id,
            transport,
            remote_addr,
            connected_at: Instant::now(),
        }
    }

    /// Time since the session was registered
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
