//! Broker-channel recovery tests

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kafka_protocol::messages::{HeartbeatRequest, HeartbeatResponse};
use kafka_protocol::protocol::StrBytes;

use common::{encode_body, unused_port, MockBroker, MockReply};
use streamwire::{BrokerAddr, BrokerChannel, KafkaRequest, KafkaResponse, TcpOptions, WireError};

fn heartbeat() -> KafkaRequest {
    KafkaRequest::Heartbeat(HeartbeatRequest::default())
}

#[tokio::test]
async fn connect_fails_eagerly_when_broker_is_down() {
    let addr = BrokerAddr::new("127.0.0.1", unused_port());
    let result = BrokerChannel::connect(
        addr,
        StrBytes::from_static_str("channel-test"),
        TcpOptions::default(),
    )
    .await;
    assert!(matches!(result, Err(WireError::Io(_))));
}

#[tokio::test]
async fn lost_session_recovers_and_retries_the_request() {
    // First request tears the connection down; the retry on the rebuilt
    // session succeeds.
    let served = Arc::new(AtomicUsize::new(0));
    let served_in_handler = served.clone();
    let broker = MockBroker::spawn(move |_| {
        if served_in_handler.fetch_add(1, Ordering::SeqCst) == 0 {
            MockReply::Hangup
        } else {
            MockReply::Body(encode_body(&HeartbeatResponse::default().with_error_code(0)))
        }
    })
    .await;

    let channel = BrokerChannel::connect(
        broker.broker_addr(),
        StrBytes::from_static_str("channel-test"),
        TcpOptions::default(),
    )
    .await
    .unwrap();

    let response = channel.send(heartbeat()).await.unwrap();
    assert!(matches!(response, KafkaResponse::Heartbeat(_)));
    // The broker saw the original attempt and the retry.
    assert_eq!(broker.request_count(), 2);
}

#[tokio::test]
async fn decode_failures_escalate_instead_of_reconnecting() {
    // An empty heartbeat body cannot decode; that is corruption, not a
    // transport blip, so the channel must not loop on reconnects.
    let broker = MockBroker::spawn(|_| MockReply::Body(bytes::Bytes::new())).await;
    let channel = BrokerChannel::connect(
        broker.broker_addr(),
        StrBytes::from_static_str("channel-test"),
        TcpOptions::default(),
    )
    .await
    .unwrap();

    let err = channel.send(heartbeat()).await.unwrap_err();
    assert!(matches!(err, WireError::Decode(_)), "got {:?}", err);
    assert_eq!(broker.request_count(), 1);
}

#[tokio::test]
async fn close_fails_in_flight_requests_with_closed() {
    // The broker never answers, so the request is parked in the pending
    // table when the channel is torn down.
    let broker = MockBroker::spawn(|_| MockReply::Ignore).await;
    let channel = BrokerChannel::connect(
        broker.broker_addr(),
        StrBytes::from_static_str("channel-test"),
        TcpOptions::default(),
    )
    .await
    .unwrap();

    let in_flight = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.send(heartbeat()).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    channel.close();

    let result = in_flight.await.unwrap();
    assert!(matches!(result.unwrap_err(), WireError::Closed));

    // Close is terminal: later sends fail instead of reconnecting, and the
    // broker never sees another request.
    let err = channel.send(heartbeat()).await.unwrap_err();
    assert!(matches!(err, WireError::Closed));
    assert_eq!(broker.request_count(), 1);

    // Closing again is a no-op.
    channel.close();
}

#[tokio::test]
async fn concurrent_sends_share_one_connection() {
    let broker = MockBroker::spawn(|request| {
        MockReply::Body(encode_body(
            &HeartbeatResponse::default().with_error_code(request.correlation_id as i16),
        ))
    })
    .await;
    let channel = BrokerChannel::connect(
        broker.broker_addr(),
        StrBytes::from_static_str("channel-test"),
        TcpOptions::default(),
    )
    .await
    .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send(heartbeat()).await })
        })
        .collect();
    let mut codes = Vec::new();
    for task in tasks {
        match task.await.unwrap().unwrap() {
            KafkaResponse::Heartbeat(r) => codes.push(r.error_code),
            other => panic!("wrong kind: {:?}", other),
        }
    }
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), 8, "every request got its own reply");
    assert_eq!(broker.request_count(), 8);
}
