//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Listener settings for one transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whether this transport is served
    pub enabled: bool,

    /// Address to bind to
    pub address: SocketAddr,
}

impl TransportConfig {
    fn new(address: SocketAddr) -> Self {
        Self {
            enabled: true,
            address,
        }
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SSH listener
    pub ssh: TransportConfig,

    /// Telnet listener
    pub telnet: TransportConfig,

    /// Disconnect if nothing is read or written for this long (zero = never)
    pub idle_timeout: Duration,

    /// Absolute session length limit (zero = unlimited)
    pub max_timeout: Duration,

    /// How long shutdown waits for sessions to finish
    pub shutdown_grace: Duration,

    /// Playback speed multiplier for streamed sessions
    pub speed: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ssh: TransportConfig::new(SocketAddr::from(([0, 0, 0, 0], 22))),
            telnet: TransportConfig::new(SocketAddr::from(([0, 0, 0, 0], 23))),
            idle_timeout: Duration::from_secs(15 * 60),
            max_timeout: Duration::from_secs(2 * 60 * 60),
            shutdown_grace: Duration::from_secs(10),
            speed: 1.0,
        }
    }
}

impl ServerConfig {
    /// Set the SSH bind address
    pub fn ssh_addr(mut self, addr: SocketAddr) -> Self {
        self.ssh.address = addr;
        self
    }

    /// Set the telnet bind address
    pub fn telnet_addr(mut self, addr: SocketAddr) -> Self {
        self.telnet.address = addr;
        self
    }

    /// Stop serving SSH
    pub fn disable_ssh(mut self) -> Self {
        self.ssh.enabled = false;
        self
    }

    /// Stop serving telnet
    pub fn disable_telnet(mut self) -> Self {
        self.telnet.enabled = false;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set max session timeout
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Set shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set playback speed
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Check the values a server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(Error::Config(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if !self.ssh.enabled && !self.telnet.enabled {
            return Err(Error::Config("no transport enabled".into()));
        }
        Ok(())
    }
}
