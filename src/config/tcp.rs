//! TCP socket configuration for broker connections
//!
//! Controls the socket options applied to every broker connection the client
//! opens. These settings affect connection reliability and throughput.

use super::defaults::{
    DEFAULT_TCP_KEEPALIVE_ENABLED, DEFAULT_TCP_NODELAY, DEFAULT_TCP_RECV_BUFFER_SIZE,
    DEFAULT_TCP_SEND_BUFFER_SIZE,
};

/// TCP socket options for broker connections.
///
/// Broker sockets are opened with exclusive address use; the remaining knobs
/// are configurable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpOptions {
    /// Disable Nagle's algorithm (TCP_NODELAY)
    pub nodelay: bool,

    /// Enable TCP keepalive
    pub keepalive_enabled: bool,

    /// TCP receive buffer size in bytes (SO_RCVBUF)
    /// Set to 0 to use OS default
    pub recv_buffer_size: u32,

    /// TCP send buffer size in bytes (SO_SNDBUF)
    /// Set to 0 to use OS default
    pub send_buffer_size: u32,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            nodelay: DEFAULT_TCP_NODELAY,
            keepalive_enabled: DEFAULT_TCP_KEEPALIVE_ENABLED,
            recv_buffer_size: DEFAULT_TCP_RECV_BUFFER_SIZE,
            send_buffer_size: DEFAULT_TCP_SEND_BUFFER_SIZE,
        }
    }
}

impl TcpOptions {
    /// Create options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Options tuned for high-throughput workloads
    pub fn high_throughput() -> Self {
        Self {
            nodelay: false,
            keepalive_enabled: true,
            recv_buffer_size: 1024 * 1024, // 1MB
            send_buffer_size: 1024 * 1024, // 1MB
        }
    }

    /// Check if the configuration uses OS default buffer sizes
    pub fn uses_os_default_buffers(&self) -> bool {
        self.recv_buffer_size == 0 && self.send_buffer_size == 0
    }
}
