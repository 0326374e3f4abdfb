//! Default constants for client configuration

/// Default Kafka broker port when a bootstrap address carries none
pub const DEFAULT_KAFKA_PORT: u16 = 9092;

/// Disable Nagle's algorithm on broker sockets
pub const DEFAULT_TCP_NODELAY: bool = true;

/// Enable TCP keepalive on broker sockets
pub const DEFAULT_TCP_KEEPALIVE_ENABLED: bool = true;

/// TCP receive buffer size in bytes (0 = OS default)
pub const DEFAULT_TCP_RECV_BUFFER_SIZE: u32 = 0;

/// TCP send buffer size in bytes (0 = OS default)
pub const DEFAULT_TCP_SEND_BUFFER_SIZE: u32 = 0;

/// Prefix for generated client ids
pub const CLIENT_ID_PREFIX: &str = "streamwire";

/// Length of the random suffix in generated client ids
pub const CLIENT_ID_SUFFIX_LEN: usize = 8;
