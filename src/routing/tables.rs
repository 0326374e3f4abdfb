//! Reactive routing tables
//!
//! Four primary maps track what the client knows about the cluster, and two
//! derived maps answer the only questions routing asks: which channel owns a
//! (topic, partition), and which channel speaks for a group.
//!
//! ```text
//! chan_by_topic = chan_by_host ∘ (host_by_node ∘ node_by_topic)
//! chan_by_group = chan_by_host ∘ host_by_group
//! ```
//!
//! Derivation drops pairs whose intermediate lookup fails; a routing-time
//! miss surfaces as `MissingRoute`. Derived maps settle asynchronously and
//! equal the pure composition of their inputs at quiescence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kafka_protocol::messages::{BrokerId, GroupId, TopicName};
use tokio::time::timeout;
use tracing::warn;

use super::reactive::{derive2, Reactive};
use crate::channel::BrokerChannel;
use crate::config::BrokerAddr;
use crate::error::{Result, WireError};

/// A topic shard: (topic, partition index)
pub type TopicPartition = (TopicName, i32);

/// How long to wait for a derived map to settle after an input change
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// The routing state of one client
pub struct RoutingTables {
    /// Endpoint → channel, one per broker the client has connected to
    chan_by_host: Reactive<HashMap<BrokerAddr, BrokerChannel>>,
    /// Broker id → endpoint, from the latest metadata
    host_by_node: Reactive<HashMap<BrokerId, BrokerAddr>>,
    /// (topic, partition) → leader id, from the latest metadata
    node_by_topic: Reactive<HashMap<TopicPartition, BrokerId>>,
    /// Group id → coordinator endpoint
    host_by_group: Reactive<HashMap<GroupId, BrokerAddr>>,
    /// Intermediate: (topic, partition) → leader endpoint.
    /// Kept alive here; dropping it would sever the derivation chain.
    #[allow(dead_code)]
    host_by_topic: Arc<Reactive<HashMap<TopicPartition, BrokerAddr>>>,
    /// Derived: (topic, partition) → channel to the leader
    chan_by_topic: Arc<Reactive<HashMap<TopicPartition, BrokerChannel>>>,
    /// Derived: group id → channel to the coordinator
    chan_by_group: Arc<Reactive<HashMap<GroupId, BrokerChannel>>>,
}

impl RoutingTables {
    /// Empty tables with live derivations
    pub fn new() -> Self {
        let chan_by_host = Reactive::new(HashMap::new());
        let host_by_node = Reactive::new(HashMap::new());
        let node_by_topic = Reactive::new(HashMap::new());
        let host_by_group = Reactive::new(HashMap::new());

        let host_by_topic = derive2(
            &host_by_node,
            &node_by_topic,
            |hosts: &HashMap<BrokerId, BrokerAddr>, leaders: &HashMap<TopicPartition, BrokerId>| {
                leaders
                    .iter()
                    .filter_map(|(key, node)| {
                        hosts.get(node).map(|addr| (key.clone(), addr.clone()))
                    })
                    .collect::<HashMap<_, _>>()
            },
        );
        let chan_by_topic = derive2(
            &chan_by_host,
            &host_by_topic,
            |channels: &HashMap<BrokerAddr, BrokerChannel>,
             hosts: &HashMap<TopicPartition, BrokerAddr>| {
                hosts
                    .iter()
                    .filter_map(|(key, addr)| {
                        channels.get(addr).map(|ch| (key.clone(), ch.clone()))
                    })
                    .collect::<HashMap<_, _>>()
            },
        );
        let chan_by_group = derive2(
            &chan_by_host,
            &host_by_group,
            |channels: &HashMap<BrokerAddr, BrokerChannel>,
             groups: &HashMap<GroupId, BrokerAddr>| {
                groups
                    .iter()
                    .filter_map(|(group, addr)| {
                        channels.get(addr).map(|ch| (group.clone(), ch.clone()))
                    })
                    .collect::<HashMap<_, _>>()
            },
        );

        Self {
            chan_by_host,
            host_by_node,
            node_by_topic,
            host_by_group,
            host_by_topic,
            chan_by_topic,
            chan_by_group,
        }
    }

    /// Register a channel for a broker endpoint
    pub fn insert_channel(&self, addr: BrokerAddr, channel: BrokerChannel) {
        self.chan_by_host.update(|m| {
            m.insert(addr.clone(), channel.clone());
        });
    }

    /// The channel already connected to `addr`, if any
    pub fn channel_for_host(&self, addr: &BrokerAddr) -> Option<BrokerChannel> {
        self.chan_by_host.with(|m| m.get(addr).cloned())
    }

    /// Record broker id → endpoint pairs from a metadata reply
    pub fn apply_brokers(&self, brokers: &[(BrokerId, BrokerAddr)]) {
        if brokers.is_empty() {
            return;
        }
        self.host_by_node.update(|m| {
            for (node, addr) in brokers {
                m.insert(*node, addr.clone());
            }
        });
    }

    /// Record (topic, partition) → leader pairs from a metadata reply
    pub fn apply_partition_leaders(&self, leaders: &[(TopicPartition, BrokerId)]) {
        if leaders.is_empty() {
            return;
        }
        self.node_by_topic.update(|m| {
            for (key, node) in leaders {
                m.insert(key.clone(), *node);
            }
        });
    }

    /// Record a group's coordinator endpoint; a no-op when unchanged
    pub fn set_group_coordinator(&self, group: GroupId, addr: BrokerAddr) {
        self.host_by_group.update(|m| {
            m.insert(group.clone(), addr.clone());
        });
    }

    /// Snapshot: endpoint → channel
    pub fn hosts(&self) -> HashMap<BrokerAddr, BrokerChannel> {
        self.chan_by_host.get()
    }

    /// Snapshot: broker id → endpoint
    pub fn node_hosts(&self) -> HashMap<BrokerId, BrokerAddr> {
        self.host_by_node.get()
    }

    /// Snapshot: (topic, partition) → leader id
    pub fn topic_leaders(&self) -> HashMap<TopicPartition, BrokerId> {
        self.node_by_topic.get()
    }

    /// Snapshot: group id → coordinator endpoint
    pub fn group_hosts(&self) -> HashMap<GroupId, BrokerAddr> {
        self.host_by_group.get()
    }

    /// Snapshot of the derived (topic, partition) → channel map
    pub fn topic_channels(&self) -> HashMap<TopicPartition, BrokerChannel> {
        self.chan_by_topic.get()
    }

    /// Snapshot of the derived group → channel map
    pub fn group_channels(&self) -> HashMap<GroupId, BrokerChannel> {
        self.chan_by_group.get()
    }

    /// Subscribe to changes of the derived (topic, partition) → channel map
    pub fn subscribe_topic_channels(
        &self,
    ) -> tokio::sync::watch::Receiver<HashMap<TopicPartition, BrokerChannel>> {
        self.chan_by_topic.subscribe()
    }

    /// Channel to the coordinator of `group`
    pub fn channel_for_group(&self, group: &GroupId) -> Result<BrokerChannel> {
        self.chan_by_group
            .with(|m| m.get(group).cloned())
            .ok_or_else(|| WireError::MissingGroupRoute(group.as_str().to_string()))
    }

    /// Wait until the derived topic map covers `keys`.
    ///
    /// Only call with keys whose leader endpoint has a registered channel;
    /// others can never settle and the wait times out with a warning.
    pub async fn topic_routes_settled(&self, keys: &[TopicPartition]) {
        if keys.is_empty() {
            return;
        }
        let mut rx = self.chan_by_topic.subscribe();
        let wait = rx.wait_for(|m| keys.iter().all(|k| m.contains_key(k)));
        if timeout(SETTLE_TIMEOUT, wait).await.is_err() {
            warn!(keys = keys.len(), "derived topic routes did not settle");
        }
    }

    /// Wait until the derived group map covers `group`
    pub async fn group_route_settled(&self, group: &GroupId) {
        let mut rx = self.chan_by_group.subscribe();
        let wait = rx.wait_for(|m| m.contains_key(group));
        if timeout(SETTLE_TIMEOUT, wait).await.is_err() {
            warn!(group = group.as_str(), "derived group route did not settle");
        }
    }

    /// Drop every route and hand back the channels for disposal
    pub fn clear(&self) -> Vec<BrokerChannel> {
        let mut released = Vec::new();
        self.chan_by_host.update(|m| {
            released.extend(m.drain().map(|(_, ch)| ch));
        });
        self.host_by_node.update(|m| m.clear());
        self.node_by_topic.update(|m| m.clear());
        self.host_by_group.update(|m| m.clear());
        released
    }
}

impl Default for RoutingTables {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RoutingTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTables")
            .field("hosts", &self.chan_by_host.with(|m| m.len()))
            .field("nodes", &self.host_by_node.with(|m| m.len()))
            .field("partitions", &self.node_by_topic.with(|m| m.len()))
            .field("groups", &self.host_by_group.with(|m| m.len()))
            .finish()
    }
}
