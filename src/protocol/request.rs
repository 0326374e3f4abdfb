//! Typed requests and their wire encoding
//!
//! Outgoing payload layout: `int16 apiKey, int16 apiVersion,
//! int32 correlationId, nullable_string clientId, <body>`. The body encoding
//! is delegated to `kafka_protocol`; this client speaks api version 0
//! throughout, for which every request header is version 1.

use bytes::{Bytes, BytesMut};
use kafka_protocol::messages::{
    ApiKey, DescribeGroupsRequest, FetchRequest, FindCoordinatorRequest, HeartbeatRequest,
    JoinGroupRequest, LeaveGroupRequest, ListGroupsRequest, ListOffsetsRequest, MetadataRequest,
    OffsetCommitRequest, OffsetFetchRequest, ProduceRequest, RequestHeader, SyncGroupRequest,
};
use kafka_protocol::protocol::{Encodable, StrBytes};

use crate::error::{Result, WireError};

/// The protocol version this client speaks
pub const API_VERSION: i16 = 0;

/// Request header version for v0 bodies (none of them are flexible)
const REQUEST_HEADER_VERSION: i16 = 1;

/// A typed Kafka request
#[derive(Debug, Clone)]
pub enum KafkaRequest {
    Produce(ProduceRequest),
    Fetch(FetchRequest),
    ListOffsets(ListOffsetsRequest),
    Metadata(MetadataRequest),
    OffsetCommit(OffsetCommitRequest),
    OffsetFetch(OffsetFetchRequest),
    FindCoordinator(FindCoordinatorRequest),
    JoinGroup(JoinGroupRequest),
    Heartbeat(HeartbeatRequest),
    LeaveGroup(LeaveGroupRequest),
    SyncGroup(SyncGroupRequest),
    DescribeGroups(DescribeGroupsRequest),
    ListGroups(ListGroupsRequest),
}

impl KafkaRequest {
    /// The api key identifying this request type on the wire
    pub fn api_key(&self) -> ApiKey {
        match self {
            KafkaRequest::Produce(_) => ApiKey::ProduceKey,
            KafkaRequest::Fetch(_) => ApiKey::FetchKey,
            KafkaRequest::ListOffsets(_) => ApiKey::ListOffsetsKey,
            KafkaRequest::Metadata(_) => ApiKey::MetadataKey,
            KafkaRequest::OffsetCommit(_) => ApiKey::OffsetCommitKey,
            KafkaRequest::OffsetFetch(_) => ApiKey::OffsetFetchKey,
            KafkaRequest::FindCoordinator(_) => ApiKey::FindCoordinatorKey,
            KafkaRequest::JoinGroup(_) => ApiKey::JoinGroupKey,
            KafkaRequest::Heartbeat(_) => ApiKey::HeartbeatKey,
            KafkaRequest::LeaveGroup(_) => ApiKey::LeaveGroupKey,
            KafkaRequest::SyncGroup(_) => ApiKey::SyncGroupKey,
            KafkaRequest::DescribeGroups(_) => ApiKey::DescribeGroupsKey,
            KafkaRequest::ListGroups(_) => ApiKey::ListGroupsKey,
        }
    }

    /// True when the broker will not send a reply: a produce with
    /// required-acks = 0
    pub fn is_ackless(&self) -> bool {
        matches!(self, KafkaRequest::Produce(r) if r.acks == 0)
    }

    /// Encode header and body into one unframed payload.
    ///
    /// Sizes are computed up front so the buffer is allocated once.
    pub fn encode(&self, correlation_id: i32, client_id: &StrBytes) -> Result<Bytes> {
        let header = RequestHeader::default()
            .with_request_api_key(self.api_key() as i16)
            .with_request_api_version(API_VERSION)
            .with_correlation_id(correlation_id)
            .with_client_id(Some(client_id.clone()));

        match self {
            KafkaRequest::Produce(body) => encode_with(&header, body),
            KafkaRequest::Fetch(body) => encode_with(&header, body),
            KafkaRequest::ListOffsets(body) => encode_with(&header, body),
            KafkaRequest::Metadata(body) => encode_with(&header, body),
            KafkaRequest::OffsetCommit(body) => encode_with(&header, body),
            KafkaRequest::OffsetFetch(body) => encode_with(&header, body),
            KafkaRequest::FindCoordinator(body) => encode_with(&header, body),
            KafkaRequest::JoinGroup(body) => encode_with(&header, body),
            KafkaRequest::Heartbeat(body) => encode_with(&header, body),
            KafkaRequest::LeaveGroup(body) => encode_with(&header, body),
            KafkaRequest::SyncGroup(body) => encode_with(&header, body),
            KafkaRequest::DescribeGroups(body) => encode_with(&header, body),
            KafkaRequest::ListGroups(body) => encode_with(&header, body),
        }
    }
}

fn encode_with<T: Encodable>(header: &RequestHeader, body: &T) -> Result<Bytes> {
    let size = header
        .compute_size(REQUEST_HEADER_VERSION)
        .map_err(|e| WireError::Encode(e.to_string()))?
        + body
            .compute_size(API_VERSION)
            .map_err(|e| WireError::Encode(e.to_string()))?;

    let mut buf = BytesMut::with_capacity(size);
    header
        .encode(&mut buf, REQUEST_HEADER_VERSION)
        .map_err(|e| WireError::Encode(e.to_string()))?;
    body.encode(&mut buf, API_VERSION)
        .map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(buf.freeze())
}
