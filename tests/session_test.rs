//! Session multiplexing tests against loopback peers

mod common;

use std::time::Duration;

use kafka_protocol::messages::{FetchRequest, HeartbeatRequest, HeartbeatResponse, ProduceRequest};
use kafka_protocol::protocol::StrBytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use common::{encode_body, read_request_frame, write_reply, MockBroker, MockReply};
use streamwire::{KafkaRequest, KafkaResponse, Session, WireError};

async fn session_to(addr: std::net::SocketAddr) -> Session {
    let stream = TcpStream::connect(addr).await.expect("connect to peer");
    Session::start(stream, StrBytes::from_static_str("session-test"))
}

fn heartbeat() -> KafkaRequest {
    KafkaRequest::Heartbeat(HeartbeatRequest::default())
}

/// Peer that reads two requests, then answers them in reverse order, each
/// reply carrying its own correlation id in the error-code field.
async fn reversing_peer() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind peer");
    let addr = listener.local_addr().expect("peer addr");
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut ids = Vec::new();
        for _ in 0..2 {
            let payload = read_request_frame(&mut stream).await.expect("read request");
            let id = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            ids.push(id);
        }
        for &id in ids.iter().rev() {
            let body = encode_body(&HeartbeatResponse::default().with_error_code(id as i16));
            write_reply(&mut stream, id, &body).await;
        }
        // Keep the connection open until the client goes away.
        let _ = read_request_frame(&mut stream).await;
    });
    addr
}

#[tokio::test]
async fn replies_match_by_correlation_id_regardless_of_order() {
    let addr = reversing_peer().await;
    let session = session_to(addr).await;

    let first = session.send(heartbeat());
    let second = session.send(heartbeat());
    let (first, second) = tokio::join!(first, second);

    // Correlation ids start at 1; each reply echoes the id it answers.
    match first.unwrap() {
        KafkaResponse::Heartbeat(r) => assert_eq!(r.error_code, 1),
        other => panic!("wrong kind: {:?}", other),
    }
    match second.unwrap() {
        KafkaResponse::Heartbeat(r) => assert_eq!(r.error_code, 2),
        other => panic!("wrong kind: {:?}", other),
    }
}

#[tokio::test]
async fn correlation_ids_are_unique_and_increasing() {
    let broker = MockBroker::spawn(|request| {
        MockReply::Body(encode_body(
            &HeartbeatResponse::default().with_error_code(request.correlation_id as i16),
        ))
    })
    .await;
    let session = session_to(broker.addr()).await;

    let mut seen = Vec::new();
    for _ in 0..8 {
        match session.send(heartbeat()).await.unwrap() {
            KafkaResponse::Heartbeat(r) => seen.push(r.error_code),
            other => panic!("wrong kind: {:?}", other),
        }
    }
    let mut sorted = seen.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 8, "correlation ids must be unique");
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "ids increase in send order");
}

#[tokio::test]
async fn ackless_produce_synthesizes_reply_without_registration() {
    let broker = MockBroker::spawn(|_| MockReply::Ignore).await;
    let session = session_to(broker.addr()).await;

    let response = session
        .send(KafkaRequest::Produce(ProduceRequest::default().with_acks(0)))
        .await
        .unwrap();
    match response {
        KafkaResponse::Produce(r) => assert!(r.responses.is_empty()),
        other => panic!("wrong kind: {:?}", other),
    }
    // The pending table never grew.
    assert_eq!(session.in_flight(), 0);
}

#[tokio::test]
async fn cancelled_send_removes_its_pending_entry() {
    let broker = MockBroker::spawn(|_| MockReply::Ignore).await;
    let session = session_to(broker.addr()).await;

    {
        let pending = session.send(KafkaRequest::Fetch(FetchRequest::default()));
        // The peer never answers; the future stays pending.
        let waited = timeout(Duration::from_millis(100), pending).await;
        assert!(waited.is_err(), "request should still be in flight");
    }
    // Dropping the future cleaned up its entry.
    assert_eq!(session.in_flight(), 0);
}

#[tokio::test]
async fn peer_hangup_fails_pending_and_later_sends() {
    let broker = MockBroker::spawn(|_| MockReply::Hangup).await;
    let session = session_to(broker.addr()).await;

    let err = session.send(heartbeat()).await.unwrap_err();
    assert!(matches!(err, WireError::SessionClosed), "got {:?}", err);
    assert!(session.is_closed());

    // Failure is sticky: no new requests are accepted.
    let err = session.send(heartbeat()).await.unwrap_err();
    assert!(matches!(err, WireError::SessionClosed), "got {:?}", err);
    assert_eq!(session.in_flight(), 0);
}

#[tokio::test]
async fn undecodable_reply_corrupts_the_session() {
    // An empty heartbeat body cannot decode (the error code is missing).
    let broker = MockBroker::spawn(|_| MockReply::Body(bytes::Bytes::new())).await;
    let session = session_to(broker.addr()).await;

    let err = session.send(heartbeat()).await.unwrap_err();
    assert!(matches!(err, WireError::Decode(_)), "got {:?}", err);
    assert!(session.is_closed());
}

#[tokio::test]
async fn shutdown_completes_pending_with_closed() {
    let broker = MockBroker::spawn(|_| MockReply::Ignore).await;
    let session = std::sync::Arc::new(session_to(broker.addr()).await);

    let sender = session.clone();
    let pending = tokio::spawn(async move { sender.send(heartbeat()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.shutdown();

    let result = pending.await.unwrap();
    assert!(matches!(result.unwrap_err(), WireError::Closed));
    assert_eq!(session.in_flight(), 0);
}
