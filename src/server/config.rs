//! Server configuration
//!
//! Per-listener settings derived from the `server` section.

use crate::config::ServerSettings;
use std::net::SocketAddr;
use std::time::Duration;

/// Settings for one listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: SocketAddr,

    /// Maximum UDP packet size
    pub max_udp_size: usize,

    /// Maximum TCP message size
    pub max_tcp_size: usize,

    /// Idle TCP connections are closed after this long
    pub tcp_idle_timeout: Duration,

    /// How long in-flight queries may run after shutdown starts
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// Create a configuration for `addr` with default limits
    pub fn new(addr: SocketAddr) -> Self {
        Self::from_settings(addr, &ServerSettings::default())
    }

    /// Create a configuration for `addr` from the `server` section
    pub fn from_settings(addr: SocketAddr, settings: &ServerSettings) -> Self {
        Self {
            addr,
            max_udp_size: settings.max_udp_size,
            max_tcp_size: settings.max_tcp_size,
            tcp_idle_timeout: Duration::from_millis(settings.tcp_idle_timeout_ms),
            shutdown_grace: Duration::from_millis(settings.shutdown_grace_ms),
        }
    }

    /// Set the maximum TCP message size
    pub fn with_max_tcp_size(mut self, size: usize) -> Self {
        self.max_tcp_size = size;
        self
    }

    /// Set the TCP idle timeout
    pub fn with_tcp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_idle_timeout = timeout;
        self
    }
}
