//! Cluster client: the public entry point
//!
//! A [`ClusterClient`] owns the bootstrap channel, the routing tables, and
//! the router. `connect` walks the configured bootstrap endpoints in order
//! and binds the first reachable broker; `get_metadata` and
//! `connect_group_coordinator` feed the routing tables; `send` dispatches a
//! typed request through the router and runs the error classifier on the
//! reply.

pub mod classify;

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::{
    BrokerId, FindCoordinatorRequest, GroupId, MetadataRequest, MetadataResponse, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use tracing::{debug, info, warn};

use crate::channel::BrokerChannel;
use crate::config::{BrokerAddr, ClientConfig, TcpOptions};
use crate::error::{ErrorCode, Result, WireError};
use crate::protocol::{KafkaRequest, KafkaResponse};
use crate::routing::{Router, RoutingTables, TopicPartition};
use classify::{classify, Disposition};

/// A connected client for one Kafka cluster.
///
/// Cheap to clone; clones share every channel and table.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClientInner>,
}

/// A cloneable handle to the routed request/response function.
///
/// Only exists for connected clients, so holding one implies routing is
/// ready to use.
#[derive(Debug, Clone)]
pub struct RoutedChannel {
    client: ClusterClient,
}

impl RoutedChannel {
    /// Send a typed request through the owning client's router
    pub async fn send(&self, request: KafkaRequest) -> Result<KafkaResponse> {
        self.client.send(request).await
    }
}

struct ClientInner {
    client_id: StrBytes,
    tcp: TcpOptions,
    tables: Arc<RoutingTables>,
    router: Router,
    bootstrap: BrokerChannel,
    refresh_inflight: AtomicBool,
    closed: AtomicBool,
}

impl ClusterClient {
    /// Connect to the cluster.
    ///
    /// Each configured bootstrap endpoint is attempted in order; the first
    /// that yields a working channel becomes the bootstrap channel. Fails
    /// with [`WireError::Unreachable`] when the list is exhausted.
    pub async fn connect(config: ClientConfig) -> Result<ClusterClient> {
        config.validate()?;
        let client_id = StrBytes::from_string(config.effective_client_id());

        let mut bootstrap = None;
        for addr in &config.bootstrap_servers {
            match BrokerChannel::connect(addr.clone(), client_id.clone(), config.tcp.clone()).await
            {
                Ok(channel) => {
                    info!(broker = %addr, client_id = client_id.as_str(), "bootstrap channel established");
                    bootstrap = Some(channel);
                    break;
                }
                Err(e) => {
                    warn!(broker = %addr, error = %e, "bootstrap endpoint unreachable");
                }
            }
        }
        let bootstrap = bootstrap.ok_or(WireError::Unreachable)?;

        // The bootstrap channel stays out of the host map: shutdown owns it
        // directly and metadata never replaces it.
        let tables = Arc::new(RoutingTables::new());
        let router = Router::new(tables.clone(), bootstrap.clone());

        Ok(ClusterClient {
            inner: Arc::new(ClientInner {
                client_id,
                tcp: config.tcp,
                tables,
                router,
                bootstrap,
                refresh_inflight: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Send a typed request through the router.
    ///
    /// Embedded error codes are classified on return: stale-leadership codes
    /// schedule a background metadata refresh (the response is still
    /// returned), transient codes are logged as retry signals, and
    /// non-recoverable codes surface as [`WireError::Protocol`].
    pub async fn send(&self, request: KafkaRequest) -> Result<KafkaResponse> {
        self.ensure_open()?;
        let response = self.inner.router.dispatch(request).await?;
        match classify(&response) {
            Disposition::Pass => Ok(response),
            Disposition::RefreshMetadata => {
                debug!("stale leadership reported; scheduling metadata refresh");
                self.schedule_metadata_refresh();
                Ok(response)
            }
            Disposition::RetryLater(code) => {
                debug!(code = code.as_i16(), "transient broker condition reported");
                Ok(response)
            }
            Disposition::Escalate(code) => Err(WireError::Protocol(code)),
        }
    }

    /// Fetch cluster metadata and fold it into the routing tables.
    ///
    /// `topics` limits the query; `None` asks for every topic. Brokers and
    /// partition leaders update the tables, and a channel is opened to every
    /// leader the client has not connected to yet.
    pub async fn get_metadata(&self, topics: Option<Vec<String>>) -> Result<MetadataResponse> {
        self.ensure_open()?;
        self.inner.fetch_and_apply_metadata(topics).await
    }

    /// Discover the coordinator for `group_id` and record the route.
    ///
    /// The coordinator's channel is reused when one exists; the group route
    /// is updated only when the coordinator moved.
    pub async fn connect_group_coordinator(&self, group_id: &str) -> Result<()> {
        self.ensure_open()?;
        let request = FindCoordinatorRequest::default()
            .with_key(StrBytes::from_string(group_id.to_string()));
        let response = self
            .inner
            .bootstrap
            .send(KafkaRequest::FindCoordinator(request))
            .await?;
        let coordinator = match response {
            KafkaResponse::FindCoordinator(r) => r,
            other => return Err(unexpected_reply(&other)),
        };

        let code = ErrorCode::from_i16(coordinator.error_code);
        if code != ErrorCode::None {
            return Err(WireError::Protocol(code));
        }

        let addr = BrokerAddr::new(coordinator.host.as_str(), coordinator.port as u16);
        info!(group = group_id, coordinator = %addr, "group coordinator discovered");
        self.inner.connect_host_new(&addr).await?;

        let group = GroupId::from(StrBytes::from_string(group_id.to_string()));
        self.inner.tables.set_group_coordinator(group.clone(), addr);
        self.inner.tables.group_route_settled(&group).await;
        Ok(())
    }

    /// A handle to the routed request/response function
    pub fn channel(&self) -> RoutedChannel {
        RoutedChannel {
            client: self.clone(),
        }
    }

    /// The routing tables backing this client
    pub fn tables(&self) -> &RoutingTables {
        &self.inner.tables
    }

    /// The endpoint the bootstrap channel is bound to
    pub fn bootstrap_addr(&self) -> &BrokerAddr {
        self.inner.bootstrap.addr()
    }

    /// Release every channel. In-flight and later requests fail with
    /// [`WireError::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("closing client");
        self.inner.bootstrap.close();
        for channel in self.inner.tables.clear() {
            channel.close();
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(WireError::Closed);
        }
        Ok(())
    }

    /// Kick off one background metadata refresh; concurrent signals coalesce
    /// into the refresh already in flight.
    fn schedule_metadata_refresh(&self) {
        if self.inner.refresh_inflight.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let known: BTreeSet<String> = inner
                .tables
                .topic_leaders()
                .keys()
                .map(|(topic, _)| topic.as_str().to_string())
                .collect();
            let topics = if known.is_empty() {
                None
            } else {
                Some(known.into_iter().collect())
            };
            match inner.fetch_and_apply_metadata(topics).await {
                Ok(_) => debug!("background metadata refresh applied"),
                Err(e) => warn!(error = %e, "background metadata refresh failed"),
            }
            inner.refresh_inflight.store(false, Ordering::Release);
        });
    }
}

impl ClientInner {
    async fn fetch_and_apply_metadata(
        &self,
        topics: Option<Vec<String>>,
    ) -> Result<MetadataResponse> {
        let request = MetadataRequest::default().with_topics(topics.map(|names| {
            names
                .into_iter()
                .map(|name| {
                    MetadataRequestTopic::default()
                        .with_name(Some(TopicName::from(StrBytes::from_string(name))))
                })
                .collect()
        }));
        let response = self
            .bootstrap
            .send(KafkaRequest::Metadata(request))
            .await?;
        let metadata = match response {
            KafkaResponse::Metadata(r) => r,
            other => return Err(unexpected_reply(&other)),
        };
        self.apply_metadata(&metadata).await;
        Ok(metadata)
    }

    /// Fold a metadata reply into the routing tables and open channels to
    /// newly discovered leaders
    async fn apply_metadata(&self, metadata: &MetadataResponse) {
        let brokers: Vec<(BrokerId, BrokerAddr)> = metadata
            .brokers
            .iter()
            .map(|b| (b.node_id, BrokerAddr::new(b.host.as_str(), b.port as u16)))
            .collect();
        self.tables.apply_brokers(&brokers);

        let mut leaders: Vec<(TopicPartition, BrokerId)> = Vec::new();
        for topic in &metadata.topics {
            let name = match &topic.name {
                Some(name) => name,
                None => continue,
            };
            if topic.error_code != 0 {
                debug!(
                    topic = name.as_str(),
                    code = topic.error_code,
                    "metadata reported topic error"
                );
                continue;
            }
            for partition in &topic.partitions {
                if partition.error_code == 0 && partition.leader_id.0 >= 0 {
                    leaders.push(((name.clone(), partition.partition_index), partition.leader_id));
                }
            }
        }
        self.tables.apply_partition_leaders(&leaders);

        // Open a channel to every leader we have none for yet.
        let node_hosts = self.tables.node_hosts();
        let mut reachable: HashSet<BrokerAddr> = self.tables.hosts().into_keys().collect();
        let distinct_nodes: HashSet<BrokerId> = leaders.iter().map(|(_, node)| *node).collect();
        for node in distinct_nodes {
            let addr = match node_hosts.get(&node) {
                Some(addr) => addr.clone(),
                None => continue,
            };
            if reachable.contains(&addr) {
                continue;
            }
            match self.connect_host_new(&addr).await {
                Ok(_) => {
                    reachable.insert(addr);
                }
                Err(e) => {
                    warn!(node = node.0, broker = %addr, error = %e, "leader unreachable; routes to it stay unresolved");
                }
            }
        }

        // Wait for the derived routes this reply made resolvable.
        let settled: Vec<TopicPartition> = leaders
            .iter()
            .filter(|(_, node)| {
                node_hosts
                    .get(node)
                    .is_some_and(|addr| reachable.contains(addr))
            })
            .map(|(key, _)| key.clone())
            .collect();
        self.tables.topic_routes_settled(&settled).await;
    }

    /// Channel to `addr`, connecting only when none exists
    async fn connect_host_new(&self, addr: &BrokerAddr) -> Result<BrokerChannel> {
        if let Some(existing) = self.tables.channel_for_host(addr) {
            return Ok(existing);
        }
        let channel =
            BrokerChannel::connect(addr.clone(), self.client_id.clone(), self.tcp.clone()).await?;
        self.tables.insert_channel(addr.clone(), channel.clone());
        Ok(channel)
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("bootstrap", self.inner.bootstrap.addr())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .field("tables", &self.inner.tables)
            .finish()
    }
}

fn unexpected_reply(reply: &KafkaResponse) -> WireError {
    WireError::Decode(format!(
        "unexpected reply kind: {:?}",
        reply.api_key()
    ))
}
