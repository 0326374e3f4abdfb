//! Kafka wire protocol plumbing
//!
//! The byte-level pieces of the client: length-prefixed framing and the typed
//! request/response surface over the `kafka_protocol` codec.

pub mod framing;
pub mod request;
pub mod response;

pub use framing::{frame, read_frame, write_frame};
pub use request::{KafkaRequest, API_VERSION};
pub use response::KafkaResponse;
