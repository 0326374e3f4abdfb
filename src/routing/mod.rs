//! Cluster-aware request routing
//!
//! Reactive routing tables and the per-request dispatcher built on them.

pub mod reactive;
pub mod router;
pub mod tables;

pub use reactive::{derive2, Reactive};
pub use router::Router;
pub use tables::{RoutingTables, TopicPartition};
