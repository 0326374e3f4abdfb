#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # streamwire
//!
//! The connection, session-multiplexing, and routing core of a Kafka
//! wire-protocol client: a fault-tolerant request/response channel over raw
//! TCP, multiplexed by correlation id, composed into a cluster-aware routing
//! layer that dispatches each request to the broker owning the relevant
//! partition or group.
//!
//! ## Quick start
//!
//! ```no_run
//! use streamwire::{ClientConfig, ClusterClient};
//!
//! #[tokio::main]
//! async fn main() -> streamwire::Result<()> {
//!     let config = ClientConfig::from_servers(["localhost:9092"])?;
//!     let client = ClusterClient::connect(config).await?;
//!
//!     // Learn the cluster layout and open channels to partition leaders.
//!     let metadata = client.get_metadata(Some(vec!["events".to_string()])).await?;
//!     println!("{} brokers", metadata.brokers.len());
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`]: length-prefixed framing and the typed request/response
//!   surface over the `kafka_protocol` codec (api version 0)
//! - [`session`]: correlation-id multiplexing over one broker connection
//! - [`resource`]: supervised values with single-flight re-creation
//! - [`channel`]: a per-broker request/response function, rebuilt on
//!   connection loss
//! - [`routing`]: reactive routing tables and the split/merge dispatcher
//! - [`client`]: bootstrap discovery, metadata refresh, and the public
//!   [`ClusterClient`]
//! - [`config`]: client configuration
//! - [`error`]: error types and `Result` alias
//!
//! What this crate deliberately leaves out: payload compression, high-level
//! producer/consumer APIs, and consumer-group membership logic beyond
//! routing. Request bodies are treated as opaque messages; their encoding is
//! delegated to the `kafka_protocol` crate.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod resource;
pub mod routing;
pub mod session;

pub use channel::BrokerChannel;
pub use client::classify::{classify, Disposition};
pub use client::{ClusterClient, RoutedChannel};
pub use config::{BrokerAddr, ClientConfig, TcpOptions};
pub use error::{ErrorCode, Result, WireError};
pub use protocol::{KafkaRequest, KafkaResponse};
pub use resource::{Recoverable, Recovery};
pub use routing::{Reactive, Router, RoutingTables, TopicPartition};
pub use session::Session;
