//! Per-broker request/response channel
//!
//! A [`BrokerChannel`] is a request/response function bound to one broker
//! endpoint. Underneath sits a [`Recoverable`] session: the creator opens a
//! TCP socket (Nagle disabled, exclusive address use), starts a [`Session`]
//! over it, and the recovery handler recreates the pair on socket-class
//! errors while escalating everything else. A session lost mid-flight is
//! rebuilt on the next send.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use kafka_protocol::protocol::StrBytes;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

use crate::config::{BrokerAddr, TcpOptions};
use crate::error::{Result, WireError};
use crate::protocol::{KafkaRequest, KafkaResponse};
use crate::resource::{Recoverable, Recovery};
use crate::session::Session;

type SendFn = dyn Fn(KafkaRequest) -> BoxFuture<'static, Result<KafkaResponse>> + Send + Sync;

/// A channel to one broker.
///
/// Cheap to clone; clones share the underlying connection. Equality is
/// identity: two channels are equal when they share the same connection.
#[derive(Clone)]
pub struct BrokerChannel {
    addr: BrokerAddr,
    resource: Arc<Recoverable<Session>>,
    send_fn: Arc<SendFn>,
    closed: Arc<AtomicBool>,
}

impl BrokerChannel {
    /// Open a channel to `addr`, connecting eagerly.
    ///
    /// Fails when no connection can be established; afterwards the channel
    /// reconnects on its own whenever the session is lost.
    pub async fn connect(
        addr: BrokerAddr,
        client_id: StrBytes,
        tcp: TcpOptions,
    ) -> Result<BrokerChannel> {
        let closed = Arc::new(AtomicBool::new(false));
        let creator_addr = addr.clone();
        let creator_closed = closed.clone();
        let resource = Recoverable::new(
            move || {
                let addr = creator_addr.clone();
                let client_id = client_id.clone();
                let tcp = tcp.clone();
                let closed = creator_closed.clone();
                async move {
                    // A closed channel must never reconnect, even for a send
                    // that raced past the closed check.
                    if closed.load(Ordering::Acquire) {
                        return Err(WireError::Closed);
                    }
                    let stream = open_socket(&addr, &tcp).await?;
                    debug!(broker = %addr, "connected");
                    Ok(Session::start(stream, client_id))
                }
            },
            // The replaced session disposes itself on drop: its receiver task
            // stops and outstanding requests fail.
            |_session: Option<&Session>, err: &WireError| {
                if err.is_transport() {
                    Recovery::Recreate
                } else {
                    Recovery::Escalate
                }
            },
        );
        resource.create().await?;

        let send_fn = resource.inject(|session: Arc<Session>, request: KafkaRequest| async move {
            session.send(request).await
        });

        Ok(BrokerChannel {
            addr,
            resource,
            send_fn: Arc::new(send_fn),
            closed,
        })
    }

    /// Send a request on this channel and await the reply.
    ///
    /// Transport failures recover transparently: the session is rebuilt and
    /// the request retried against the fresh connection. A closed channel
    /// never reconnects; it fails with [`WireError::Closed`].
    pub async fn send(&self, request: KafkaRequest) -> Result<KafkaResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WireError::Closed);
        }
        (self.send_fn)(request).await
    }

    /// The endpoint this channel is bound to
    pub fn addr(&self) -> &BrokerAddr {
        &self.addr
    }

    /// Tear the channel down permanently. Outstanding requests complete with
    /// `Closed`, and so does every later send.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(session) = self.resource.take() {
            session.shutdown();
        }
    }
}

impl PartialEq for BrokerChannel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl Eq for BrokerChannel {}

impl fmt::Debug for BrokerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerChannel")
            .field("addr", &self.addr)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .field("resource", &self.resource)
            .finish()
    }
}

/// Open a TCP connection to the broker with the configured socket options
async fn open_socket(addr: &BrokerAddr, tcp: &TcpOptions) -> Result<TcpStream> {
    let mut last_err: Option<std::io::Error> = None;
    for sockaddr in lookup_host((addr.host.as_str(), addr.port)).await? {
        let socket = match sockaddr {
            std::net::SocketAddr::V4(_) => TcpSocket::new_v4(),
            std::net::SocketAddr::V6(_) => TcpSocket::new_v6(),
        }?;
        if let Err(e) = configure_socket(&socket, tcp) {
            last_err = Some(e);
            continue;
        }
        match socket.connect(sockaddr).await {
            Ok(stream) => {
                stream.set_nodelay(tcp.nodelay)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!(broker = %addr, peer = %sockaddr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(WireError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} resolved to no addresses", addr),
        )
    })))
}

fn configure_socket(socket: &TcpSocket, tcp: &TcpOptions) -> std::io::Result<()> {
    // Exclusive address use: the local address is never shared.
    socket.set_reuseaddr(false)?;
    socket.set_keepalive(tcp.keepalive_enabled)?;
    if tcp.recv_buffer_size > 0 {
        socket.set_recv_buffer_size(tcp.recv_buffer_size)?;
    }
    if tcp.send_buffer_size > 0 {
        socket.set_send_buffer_size(tcp.send_buffer_size)?;
    }
    Ok(())
}
