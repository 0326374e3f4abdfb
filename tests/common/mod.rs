//! Shared test fixtures for streamwire integration tests
//!
//! Provides a scriptable loopback broker speaking the framed Kafka wire
//! format, plus encode/decode helpers for building v0 response bodies.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::fetch_response::{FetchableTopicResponse, PartitionData};
use kafka_protocol::messages::metadata_response::{
    MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
};
use kafka_protocol::messages::offset_commit_response::{
    OffsetCommitResponsePartition, OffsetCommitResponseTopic,
};
use kafka_protocol::messages::produce_response::{
    PartitionProduceResponse, TopicProduceResponse,
};
use kafka_protocol::messages::{
    BrokerId, FetchRequest, FetchResponse, FindCoordinatorResponse, MetadataResponse,
    OffsetCommitRequest, OffsetCommitResponse, ProduceRequest, ProduceResponse, TopicName,
};
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use streamwire::BrokerAddr;

/// The protocol version the client speaks
pub const API_VERSION: i16 = 0;

/// A request as it arrives at a broker: header v1 fields plus the raw body
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
    pub body: Bytes,
}

/// What the mock broker does with one request
pub enum MockReply {
    /// Reply with this encoded body; the broker adds the correlation id
    Body(Bytes),
    /// Swallow the request and keep reading
    Ignore,
    /// Drop the connection
    Hangup,
}

type Handler = dyn Fn(ParsedRequest) -> MockReply + Send + Sync;

/// A loopback broker driven by a handler function
pub struct MockBroker {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockBroker {
    /// Bind an ephemeral port and serve connections with `handler`
    pub async fn spawn<H>(handler: H) -> MockBroker
    where
        H: Fn(ParsedRequest) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock broker");
        let addr = listener.local_addr().expect("mock broker addr");
        let requests = Arc::new(AtomicUsize::new(0));
        let handler: Arc<Handler> = Arc::new(handler);

        let counter = requests.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(serve_connection(stream, handler.clone(), counter.clone()));
            }
        });

        MockBroker {
            addr,
            requests,
            accept_task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn broker_addr(&self) -> BrokerAddr {
        BrokerAddr::new("127.0.0.1", self.addr.port())
    }

    /// Total requests read off all connections
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    counter: Arc<AtomicUsize>,
) {
    loop {
        let payload = match read_request_frame(&mut stream).await {
            Some(payload) => payload,
            None => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        let request = parse_request(&payload);
        let correlation_id = request.correlation_id;
        match handler(request) {
            MockReply::Body(body) => {
                write_reply(&mut stream, correlation_id, &body).await;
            }
            MockReply::Ignore => {}
            MockReply::Hangup => return,
        }
    }
}

/// Split a request payload into its header v1 fields and body
pub fn parse_request(payload: &[u8]) -> ParsedRequest {
    let api_key = i16::from_be_bytes([payload[0], payload[1]]);
    let api_version = i16::from_be_bytes([payload[2], payload[3]]);
    let correlation_id = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let client_len = i16::from_be_bytes([payload[8], payload[9]]);
    let (client_id, body_start) = if client_len < 0 {
        (None, 10)
    } else {
        let end = 10 + client_len as usize;
        (
            Some(String::from_utf8_lossy(&payload[10..end]).to_string()),
            end,
        )
    };
    ParsedRequest {
        api_key,
        api_version,
        correlation_id,
        client_id,
        body: Bytes::copy_from_slice(&payload[body_start..]),
    }
}

/// Read one length-prefixed frame; `None` on any connection error
pub async fn read_request_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

/// Frame and write a reply: correlation id then body
pub async fn write_reply(stream: &mut TcpStream, correlation_id: i32, body: &[u8]) {
    let mut frame = BytesMut::with_capacity(8 + body.len());
    frame.put_u32((4 + body.len()) as u32);
    frame.put_i32(correlation_id);
    frame.put_slice(body);
    let _ = stream.write_all(&frame).await;
    let _ = stream.flush().await;
}

/// A local port nothing listens on
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind for unused port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

/// Encode a v0 response body
pub fn encode_body<T: Encodable>(body: &T) -> Bytes {
    let mut buf = BytesMut::new();
    body.encode(&mut buf, API_VERSION).expect("encode body");
    buf.freeze()
}

/// Decode a v0 request body
pub fn decode_body<T: Decodable>(mut body: Bytes) -> T {
    T::decode(&mut body, API_VERSION).expect("decode body")
}

pub fn topic(name: &str) -> TopicName {
    TopicName::from(StrBytes::from_string(name.to_string()))
}

/// Encoded metadata reply: brokers as `(node_id, port)` on 127.0.0.1, topics
/// as `(name, [(partition, leader_id)])`
pub fn metadata_response(brokers: &[(i32, u16)], topics: &[(&str, &[(i32, i32)])]) -> Bytes {
    let brokers = brokers
        .iter()
        .map(|(node, port)| {
            MetadataResponseBroker::default()
                .with_node_id(BrokerId::from(*node))
                .with_host(StrBytes::from_static_str("127.0.0.1"))
                .with_port(*port as i32)
        })
        .collect();
    let topics = topics
        .iter()
        .map(|(name, partitions)| {
            MetadataResponseTopic::default()
                .with_error_code(0)
                .with_name(Some(topic(name)))
                .with_partitions(
                    partitions
                        .iter()
                        .map(|(partition, leader)| {
                            MetadataResponsePartition::default()
                                .with_error_code(0)
                                .with_partition_index(*partition)
                                .with_leader_id(BrokerId::from(*leader))
                                .with_replica_nodes(vec![BrokerId::from(*leader)])
                                .with_isr_nodes(vec![BrokerId::from(*leader)])
                        })
                        .collect(),
                )
        })
        .collect();
    encode_body(
        &MetadataResponse::default()
            .with_brokers(brokers)
            .with_topics(topics),
    )
}

/// Encoded fetch reply answering every partition of `request` cleanly
pub fn fetch_response_for(request: &FetchRequest) -> Bytes {
    let responses = request
        .topics
        .iter()
        .map(|t| {
            FetchableTopicResponse::default()
                .with_topic(t.topic.clone())
                .with_partitions(
                    t.partitions
                        .iter()
                        .map(|p| {
                            PartitionData::default()
                                .with_partition_index(p.partition)
                                .with_error_code(0)
                                .with_high_watermark(0)
                        })
                        .collect(),
                )
        })
        .collect();
    encode_body(&FetchResponse::default().with_responses(responses))
}

/// Encoded produce reply acking every partition of `request`, optionally
/// with a per-partition error code
pub fn produce_response_for(request: &ProduceRequest, error_code: i16) -> Bytes {
    let responses = request
        .topic_data
        .iter()
        .map(|t| {
            TopicProduceResponse::default()
                .with_name(t.name.clone())
                .with_partition_responses(
                    t.partition_data
                        .iter()
                        .map(|p| {
                            PartitionProduceResponse::default()
                                .with_index(p.index)
                                .with_error_code(error_code)
                                .with_base_offset(0)
                        })
                        .collect(),
                )
        })
        .collect();
    encode_body(&ProduceResponse::default().with_responses(responses))
}

/// Encoded offset-commit reply acking every partition of `request`
pub fn offset_commit_response_for(request: &OffsetCommitRequest) -> Bytes {
    let topics = request
        .topics
        .iter()
        .map(|t| {
            OffsetCommitResponseTopic::default()
                .with_name(t.name.clone())
                .with_partitions(
                    t.partitions
                        .iter()
                        .map(|p| {
                            OffsetCommitResponsePartition::default()
                                .with_partition_index(p.partition_index)
                                .with_error_code(0)
                        })
                        .collect(),
                )
        })
        .collect();
    encode_body(&OffsetCommitResponse::default().with_topics(topics))
}

/// Encoded find-coordinator reply pointing at 127.0.0.1:`port`
pub fn find_coordinator_response(node_id: i32, port: u16) -> Bytes {
    encode_body(
        &FindCoordinatorResponse::default()
            .with_error_code(0)
            .with_node_id(BrokerId::from(node_id))
            .with_host(StrBytes::from_static_str("127.0.0.1"))
            .with_port(port as i32),
    )
}
