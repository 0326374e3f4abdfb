//! Correlation-id multiplexing over one framed duplex stream
//!
//! A [`Session`] pairs many in-flight requests with their replies over a
//! single broker connection. Each outgoing request is assigned a correlation
//! id from a monotonically increasing counter private to the session; the
//! broker echoes the id in its reply and matching is strictly by id, so
//! replies may arrive in any order.
//!
//! Writes are serialized: two concurrent sends never interleave bytes on the
//! wire. A background receiver task reads one frame at a time, strips the
//! correlation id, and fulfills the matching pending entry, decoding the body
//! with the api kind remembered at send time (Kafka carries no discriminator
//! on the wire).
//!
//! On stream termination or decode failure the session fails permanently:
//! every pending entry completes with `SessionClosed` and later sends fail
//! fast with the same kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use kafka_protocol::messages::{ApiKey, ProduceResponse};
use kafka_protocol::protocol::StrBytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, WireError};
use crate::protocol::framing::{read_frame, write_frame};
use crate::protocol::{KafkaRequest, KafkaResponse};

/// Why a session stopped accepting requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseKind {
    /// The stream died or decoding failed
    Lost,
    /// The owner shut the session down
    Closed,
}

impl CloseKind {
    fn to_error(self) -> WireError {
        match self {
            CloseKind::Lost => WireError::SessionClosed,
            CloseKind::Closed => WireError::Closed,
        }
    }
}

/// A registered request awaiting its reply
struct Pending {
    api: ApiKey,
    tx: oneshot::Sender<Result<KafkaResponse>>,
}

struct SessionState {
    closed: Option<CloseKind>,
    pending: HashMap<i32, Pending>,
}

struct SessionInner {
    client_id: StrBytes,
    correlation: AtomicI32,
    state: Mutex<SessionState>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    abort: Mutex<Option<AbortHandle>>,
}

impl SessionInner {
    /// Transition to the failed state once: drain and complete all pending
    /// entries, stop the receiver.
    fn fail(&self, kind: CloseKind) {
        let drained: Vec<Pending> = {
            let mut st = self.state.lock();
            if st.closed.is_some() {
                return;
            }
            st.closed = Some(kind);
            st.pending.drain().map(|(_, p)| p).collect()
        };
        if !drained.is_empty() {
            debug!(pending = drained.len(), "failing outstanding requests");
        }
        for pending in drained {
            let _ = pending.tx.send(Err(kind.to_error()));
        }
        if let Some(handle) = self.abort.lock().take() {
            handle.abort();
        }
    }
}

/// Removes the pending entry when a send is cancelled before completion
struct PendingGuard<'a> {
    inner: &'a SessionInner,
    id: i32,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().pending.remove(&self.id);
        }
    }
}

/// Request/reply multiplexer over one broker connection
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Take ownership of a connected stream and start the receiver task
    pub fn start(stream: TcpStream, client_id: StrBytes) -> Session {
        let (read_half, write_half) = stream.into_split();
        let inner = Arc::new(SessionInner {
            client_id,
            correlation: AtomicI32::new(1),
            state: Mutex::new(SessionState {
                closed: None,
                pending: HashMap::new(),
            }),
            writer: tokio::sync::Mutex::new(write_half),
            abort: Mutex::new(None),
        });
        let handle = tokio::spawn(receive_loop(read_half, inner.clone()));
        *inner.abort.lock() = Some(handle.abort_handle());
        Session { inner }
    }

    /// Send a request and await the correlated reply.
    ///
    /// Ackless requests (produce with required-acks = 0) skip registration
    /// and resolve with a synthesized empty reply as soon as the bytes are
    /// written.
    pub async fn send(&self, request: KafkaRequest) -> Result<KafkaResponse> {
        if let Some(kind) = self.inner.state.lock().closed {
            return Err(kind.to_error());
        }
        let api = request.api_key();
        let ackless = request.is_ackless();

        // The id is allocated under the write lock so correlation ids
        // increase in wire order.
        let mut writer = self.inner.writer.lock().await;
        let id = self.inner.correlation.fetch_add(1, Ordering::Relaxed);
        let payload = request.encode(id, &self.inner.client_id)?;

        if ackless {
            if let Err(e) = write_framed(&mut writer, &payload).await {
                drop(writer);
                self.inner.fail(CloseKind::Lost);
                return Err(e);
            }
            trace!(correlation_id = id, "ackless request written");
            return Ok(KafkaResponse::Produce(ProduceResponse::default()));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.inner.state.lock();
            if let Some(kind) = st.closed {
                return Err(kind.to_error());
            }
            st.pending.insert(id, Pending { api, tx });
        }
        let mut guard = PendingGuard {
            inner: &self.inner,
            id,
            armed: true,
        };

        let write_result = write_framed(&mut writer, &payload).await;
        drop(writer);
        if let Err(e) = write_result {
            drop(guard);
            self.inner.fail(CloseKind::Lost);
            return Err(e);
        }
        trace!(correlation_id = id, api = ?api, "request written");

        let outcome = rx.await;
        guard.disarm();
        match outcome {
            Ok(result) => result,
            Err(_) => Err(WireError::SessionClosed),
        }
    }

    /// Number of requests currently awaiting a reply
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// True once the session stopped accepting requests
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed.is_some()
    }

    /// Shut the session down; pending requests complete with `Closed`
    pub fn shutdown(&self) {
        self.inner.fail(CloseKind::Closed);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.fail(CloseKind::Lost);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Session")
            .field("in_flight", &st.pending.len())
            .field("closed", &st.closed)
            .finish()
    }
}

async fn write_framed(writer: &mut OwnedWriteHalf, payload: &[u8]) -> Result<()> {
    // One contiguous write: prefix and payload leave in a single buffer.
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    write_frame(&mut buf, payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn receive_loop(mut reader: OwnedReadHalf, inner: Arc<SessionInner>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(mut frame)) => {
                if frame.len() < 4 {
                    warn!(len = frame.len(), "response frame shorter than a correlation id");
                    inner.fail(CloseKind::Lost);
                    return;
                }
                let correlation_id = frame.get_i32();
                let entry = inner.state.lock().pending.remove(&correlation_id);
                match entry {
                    Some(pending) => match KafkaResponse::decode(pending.api, frame.freeze()) {
                        Ok(response) => {
                            let _ = pending.tx.send(Ok(response));
                        }
                        Err(e) => {
                            // A body that fails to decode means the stream is
                            // corrupt; the session cannot continue.
                            warn!(correlation_id, error = %e, "response decode failed");
                            let _ = pending.tx.send(Err(e));
                            inner.fail(CloseKind::Lost);
                            return;
                        }
                    },
                    None => {
                        trace!(correlation_id, "late reply with no pending entry dropped");
                    }
                }
            }
            Ok(None) => {
                debug!("peer closed the stream");
                inner.fail(CloseKind::Lost);
                return;
            }
            Err(e) => {
                debug!(error = %e, "stream read failed");
                inner.fail(CloseKind::Lost);
                return;
            }
        }
    }
}
