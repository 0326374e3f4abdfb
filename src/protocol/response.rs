//! Typed responses and their wire decoding
//!
//! Incoming payload layout: `int32 correlationId, <body>`. The session strips
//! the correlation id to find the matching pending entry, so decoding here
//! starts at the body. Kafka carries no discriminator on the wire; the api
//! kind is the one remembered when the request was registered.

use bytes::Bytes;
use kafka_protocol::messages::{
    ApiKey, DescribeGroupsResponse, FetchResponse, FindCoordinatorResponse, HeartbeatResponse,
    JoinGroupResponse, LeaveGroupResponse, ListGroupsResponse, ListOffsetsResponse,
    MetadataResponse, OffsetCommitResponse, OffsetFetchResponse, ProduceResponse,
    SyncGroupResponse,
};
use kafka_protocol::protocol::Decodable;

use super::request::API_VERSION;
use crate::error::{Result, WireError};

/// A typed Kafka response
#[derive(Debug, Clone)]
pub enum KafkaResponse {
    Produce(ProduceResponse),
    Fetch(FetchResponse),
    ListOffsets(ListOffsetsResponse),
    Metadata(MetadataResponse),
    OffsetCommit(OffsetCommitResponse),
    OffsetFetch(OffsetFetchResponse),
    FindCoordinator(FindCoordinatorResponse),
    JoinGroup(JoinGroupResponse),
    Heartbeat(HeartbeatResponse),
    LeaveGroup(LeaveGroupResponse),
    SyncGroup(SyncGroupResponse),
    DescribeGroups(DescribeGroupsResponse),
    ListGroups(ListGroupsResponse),
}

impl KafkaResponse {
    /// Decode a response body for the given api kind
    pub fn decode(api: ApiKey, mut body: Bytes) -> Result<KafkaResponse> {
        fn body_of<T: Decodable>(buf: &mut Bytes) -> Result<T> {
            T::decode(buf, API_VERSION).map_err(|e| WireError::Decode(e.to_string()))
        }

        let response = match api {
            ApiKey::ProduceKey => KafkaResponse::Produce(body_of(&mut body)?),
            ApiKey::FetchKey => KafkaResponse::Fetch(body_of(&mut body)?),
            ApiKey::ListOffsetsKey => KafkaResponse::ListOffsets(body_of(&mut body)?),
            ApiKey::MetadataKey => KafkaResponse::Metadata(body_of(&mut body)?),
            ApiKey::OffsetCommitKey => KafkaResponse::OffsetCommit(body_of(&mut body)?),
            ApiKey::OffsetFetchKey => KafkaResponse::OffsetFetch(body_of(&mut body)?),
            ApiKey::FindCoordinatorKey => KafkaResponse::FindCoordinator(body_of(&mut body)?),
            ApiKey::JoinGroupKey => KafkaResponse::JoinGroup(body_of(&mut body)?),
            ApiKey::HeartbeatKey => KafkaResponse::Heartbeat(body_of(&mut body)?),
            ApiKey::LeaveGroupKey => KafkaResponse::LeaveGroup(body_of(&mut body)?),
            ApiKey::SyncGroupKey => KafkaResponse::SyncGroup(body_of(&mut body)?),
            ApiKey::DescribeGroupsKey => KafkaResponse::DescribeGroups(body_of(&mut body)?),
            ApiKey::ListGroupsKey => KafkaResponse::ListGroups(body_of(&mut body)?),
            other => {
                return Err(WireError::Decode(format!(
                    "unsupported api key: {:?}",
                    other
                )))
            }
        };
        Ok(response)
    }

    /// The api kind this response answers
    pub fn api_key(&self) -> ApiKey {
        match self {
            KafkaResponse::Produce(_) => ApiKey::ProduceKey,
            KafkaResponse::Fetch(_) => ApiKey::FetchKey,
            KafkaResponse::ListOffsets(_) => ApiKey::ListOffsetsKey,
            KafkaResponse::Metadata(_) => ApiKey::MetadataKey,
            KafkaResponse::OffsetCommit(_) => ApiKey::OffsetCommitKey,
            KafkaResponse::OffsetFetch(_) => ApiKey::OffsetFetchKey,
            KafkaResponse::FindCoordinator(_) => ApiKey::FindCoordinatorKey,
            KafkaResponse::JoinGroup(_) => ApiKey::JoinGroupKey,
            KafkaResponse::Heartbeat(_) => ApiKey::HeartbeatKey,
            KafkaResponse::LeaveGroup(_) => ApiKey::LeaveGroupKey,
            KafkaResponse::SyncGroup(_) => ApiKey::SyncGroupKey,
            KafkaResponse::DescribeGroups(_) => ApiKey::DescribeGroupsKey,
            KafkaResponse::ListGroups(_) => ApiKey::ListGroupsKey,
        }
    }
}
