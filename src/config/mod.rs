//! Configuration for the cluster client
//!
//! This module is organized into submodules:
//! - `defaults` - Default constants and values
//! - `tcp` - TCP socket options for broker connections

mod defaults;
mod tcp;

pub use defaults::*;
pub use tcp::TcpOptions;

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{Result, WireError};

/// A broker endpoint as a (host, port) pair.
///
/// Parses from `"host:port"` or bare `"host"` (default port 9092). The host
/// is kept as written; name resolution happens at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddr {
    /// Hostname or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl BrokerAddr {
    /// Create an endpoint from parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerAddr {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WireError::Config("empty bootstrap address".to_string()));
        }
        match s.rsplit_once(':') {
            // A lone colon or a colon inside an IPv6 literal without a port
            // would mis-parse; only accept the split when the tail is a port.
            Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
                Ok(port) => Ok(BrokerAddr::new(host, port)),
                Err(_) => Err(WireError::Config(format!(
                    "invalid port in bootstrap address: {}",
                    s
                ))),
            },
            _ => Ok(BrokerAddr::new(s, DEFAULT_KAFKA_PORT)),
        }
    }
}

/// Client configuration.
///
/// # Example
///
/// ```
/// use streamwire::config::ClientConfig;
///
/// let config = ClientConfig::from_servers(["localhost:9092", "localhost:9093"]).unwrap();
/// assert_eq!(config.bootstrap_servers.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ordered list of bootstrap endpoints; tried first to last
    pub bootstrap_servers: Vec<BrokerAddr>,

    /// Client id sent in every request header; generated when absent
    pub client_id: Option<String>,

    /// Socket options applied to every broker connection
    pub tcp: TcpOptions,
}

impl ClientConfig {
    /// Build a configuration from `"host:port"` strings
    pub fn from_servers<I, S>(servers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bootstrap_servers = servers
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>>>()?;
        let config = Self {
            bootstrap_servers,
            client_id: None,
            tcp: TcpOptions::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set an explicit client id
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set socket options
    pub fn with_tcp(mut self, tcp: TcpOptions) -> Self {
        self.tcp = tcp;
        self
    }

    /// Check the configuration for obvious mistakes
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(WireError::Config(
                "bootstrap_servers must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured client id, or a freshly generated one
    pub fn effective_client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => generate_client_id(),
        }
    }
}

/// Generate a random client id like `streamwire-x7k2mq9a`
pub fn generate_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CLIENT_ID_SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}", CLIENT_ID_PREFIX, suffix)
}
