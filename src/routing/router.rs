//! Per-request dispatch
//!
//! The router classifies each request and forwards it to the broker that can
//! answer it: cluster-wide queries go to the bootstrap channel, group
//! requests to the group's coordinator channel, and data-plane requests
//! (fetch, produce, list-offsets) are split by partition leader, dispatched
//! in parallel, and the partial replies merged back into one response.
//!
//! The merged response's topic order follows channel iteration order;
//! callers get multiset equality, nothing more. Dropping the returned future
//! cancels every in-flight shard.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use kafka_protocol::messages::fetch_request::FetchTopic;
use kafka_protocol::messages::list_offsets_request::ListOffsetsTopic;
use kafka_protocol::messages::produce_request::TopicProduceData;
use kafka_protocol::messages::{
    FetchRequest, FetchResponse, GroupId, ListOffsetsRequest, ListOffsetsResponse, ProduceRequest,
    ProduceResponse,
};
use tracing::trace;

use super::tables::RoutingTables;
use crate::channel::BrokerChannel;
use crate::config::BrokerAddr;
use crate::error::{Result, WireError};
use crate::protocol::{KafkaRequest, KafkaResponse};

/// Routes typed requests to the brokers that own them
pub struct Router {
    tables: Arc<RoutingTables>,
    bootstrap: BrokerChannel,
}

impl Router {
    /// Build a router over the given tables and bootstrap channel
    pub fn new(tables: Arc<RoutingTables>, bootstrap: BrokerChannel) -> Self {
        Self { tables, bootstrap }
    }

    /// Dispatch one request and return its (possibly merged) response
    pub async fn dispatch(&self, request: KafkaRequest) -> Result<KafkaResponse> {
        match request {
            // Cluster-wide queries: any broker answers; use the bootstrap.
            KafkaRequest::Metadata(_)
            | KafkaRequest::FindCoordinator(_)
            | KafkaRequest::ListGroups(_)
            | KafkaRequest::DescribeGroups(_) => self.bootstrap.send(request).await,

            // Data plane: split by partition leader and merge.
            KafkaRequest::Fetch(body) => self.dispatch_fetch(body).await,
            KafkaRequest::Produce(body) => self.dispatch_produce(body).await,
            KafkaRequest::ListOffsets(body) => self.dispatch_list_offsets(body).await,

            // Group plane: route by the owning coordinator.
            KafkaRequest::OffsetCommit(ref body) => {
                let group = body.group_id.clone();
                self.dispatch_group(group, request).await
            }
            KafkaRequest::OffsetFetch(ref body) => {
                let group = body.group_id.clone();
                self.dispatch_group(group, request).await
            }
            KafkaRequest::JoinGroup(ref body) => {
                let group = body.group_id.clone();
                self.dispatch_group(group, request).await
            }
            KafkaRequest::SyncGroup(ref body) => {
                let group = body.group_id.clone();
                self.dispatch_group(group, request).await
            }
            KafkaRequest::Heartbeat(ref body) => {
                let group = body.group_id.clone();
                self.dispatch_group(group, request).await
            }
            KafkaRequest::LeaveGroup(ref body) => {
                let group = body.group_id.clone();
                self.dispatch_group(group, request).await
            }
        }
    }

    async fn dispatch_group(&self, group: GroupId, request: KafkaRequest) -> Result<KafkaResponse> {
        let channel = self.tables.channel_for_group(&group)?;
        trace!(group = group.as_str(), broker = %channel.addr(), "group request routed");
        channel.send(request).await
    }

    async fn dispatch_fetch(&self, request: FetchRequest) -> Result<KafkaResponse> {
        let routes = self.tables.topic_channels();

        // Group requested partitions by the channel owning their leader;
        // request-level fields carry over to every shard.
        let mut shards: Vec<(BrokerChannel, FetchRequest)> = Vec::new();
        let mut by_addr: HashMap<BrokerAddr, usize> = HashMap::new();
        for topic in &request.topics {
            for partition in &topic.partitions {
                let key = (topic.topic.clone(), partition.partition);
                let channel = routes.get(&key).ok_or_else(|| {
                    WireError::MissingPartitionRoute(
                        topic.topic.as_str().to_string(),
                        partition.partition,
                    )
                })?;
                let slot = *by_addr.entry(channel.addr().clone()).or_insert_with(|| {
                    shards.push((
                        channel.clone(),
                        FetchRequest::default()
                            .with_replica_id(request.replica_id)
                            .with_max_wait_ms(request.max_wait_ms)
                            .with_min_bytes(request.min_bytes),
                    ));
                    shards.len() - 1
                });
                let shard = &mut shards[slot].1;
                match shard.topics.iter_mut().find(|t| t.topic == topic.topic) {
                    Some(t) => t.partitions.push(partition.clone()),
                    None => shard.topics.push(
                        FetchTopic::default()
                            .with_topic(topic.topic.clone())
                            .with_partitions(vec![partition.clone()]),
                    ),
                }
            }
        }

        trace!(shards = shards.len(), "fetch split by leader");
        let replies = try_join_all(shards.into_iter().map(|(channel, shard)| async move {
            channel.send(KafkaRequest::Fetch(shard)).await
        }))
        .await?;

        let mut partials = Vec::with_capacity(replies.len());
        for reply in replies {
            match reply {
                KafkaResponse::Fetch(partial) => partials.push(partial),
                other => return Err(unexpected_shard_reply(&other)),
            }
        }
        Ok(KafkaResponse::Fetch(merge_fetch(partials)))
    }

    async fn dispatch_produce(&self, request: ProduceRequest) -> Result<KafkaResponse> {
        let routes = self.tables.topic_channels();

        let mut shards: Vec<(BrokerChannel, ProduceRequest)> = Vec::new();
        let mut by_addr: HashMap<BrokerAddr, usize> = HashMap::new();
        for topic in &request.topic_data {
            for partition in &topic.partition_data {
                let key = (topic.name.clone(), partition.index);
                let channel = routes.get(&key).ok_or_else(|| {
                    WireError::MissingPartitionRoute(
                        topic.name.as_str().to_string(),
                        partition.index,
                    )
                })?;
                let slot = *by_addr.entry(channel.addr().clone()).or_insert_with(|| {
                    shards.push((
                        channel.clone(),
                        ProduceRequest::default()
                            .with_acks(request.acks)
                            .with_timeout_ms(request.timeout_ms),
                    ));
                    shards.len() - 1
                });
                let shard = &mut shards[slot].1;
                match shard.topic_data.iter_mut().find(|t| t.name == topic.name) {
                    Some(t) => t.partition_data.push(partition.clone()),
                    None => shard.topic_data.push(
                        TopicProduceData::default()
                            .with_name(topic.name.clone())
                            .with_partition_data(vec![partition.clone()]),
                    ),
                }
            }
        }

        trace!(shards = shards.len(), "produce split by leader");
        let replies = try_join_all(shards.into_iter().map(|(channel, shard)| async move {
            channel.send(KafkaRequest::Produce(shard)).await
        }))
        .await?;

        let mut partials = Vec::with_capacity(replies.len());
        for reply in replies {
            match reply {
                KafkaResponse::Produce(partial) => partials.push(partial),
                other => return Err(unexpected_shard_reply(&other)),
            }
        }
        Ok(KafkaResponse::Produce(merge_produce(partials)))
    }

    async fn dispatch_list_offsets(&self, request: ListOffsetsRequest) -> Result<KafkaResponse> {
        let routes = self.tables.topic_channels();

        let mut shards: Vec<(BrokerChannel, ListOffsetsRequest)> = Vec::new();
        let mut by_addr: HashMap<BrokerAddr, usize> = HashMap::new();
        for topic in &request.topics {
            for partition in &topic.partitions {
                let key = (topic.name.clone(), partition.partition_index);
                let channel = routes.get(&key).ok_or_else(|| {
                    WireError::MissingPartitionRoute(
                        topic.name.as_str().to_string(),
                        partition.partition_index,
                    )
                })?;
                let slot = *by_addr.entry(channel.addr().clone()).or_insert_with(|| {
                    shards.push((
                        channel.clone(),
                        ListOffsetsRequest::default().with_replica_id(request.replica_id),
                    ));
                    shards.len() - 1
                });
                let shard = &mut shards[slot].1;
                match shard.topics.iter_mut().find(|t| t.name == topic.name) {
                    Some(t) => t.partitions.push(partition.clone()),
                    None => shard.topics.push(
                        ListOffsetsTopic::default()
                            .with_name(topic.name.clone())
                            .with_partitions(vec![partition.clone()]),
                    ),
                }
            }
        }

        trace!(shards = shards.len(), "list-offsets split by leader");
        let replies = try_join_all(shards.into_iter().map(|(channel, shard)| async move {
            channel.send(KafkaRequest::ListOffsets(shard)).await
        }))
        .await?;

        let mut partials = Vec::with_capacity(replies.len());
        for reply in replies {
            match reply {
                KafkaResponse::ListOffsets(partial) => partials.push(partial),
                other => return Err(unexpected_shard_reply(&other)),
            }
        }
        Ok(KafkaResponse::ListOffsets(merge_list_offsets(partials)))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("bootstrap", self.bootstrap.addr())
            .field("tables", &self.tables)
            .finish()
    }
}

fn unexpected_shard_reply(reply: &KafkaResponse) -> WireError {
    WireError::Decode(format!(
        "shard answered with mismatched api kind: {:?}",
        reply.api_key()
    ))
}

/// Concatenate partial fetch responses, folding same-topic entries together
fn merge_fetch(partials: Vec<FetchResponse>) -> FetchResponse {
    let mut merged = FetchResponse::default();
    for partial in partials {
        for topic in partial.responses {
            match merged.responses.iter_mut().find(|t| t.topic == topic.topic) {
                Some(existing) => existing.partitions.extend(topic.partitions),
                None => merged.responses.push(topic),
            }
        }
    }
    merged
}

/// Concatenate partial produce responses, folding same-topic entries together
fn merge_produce(partials: Vec<ProduceResponse>) -> ProduceResponse {
    let mut merged = ProduceResponse::default();
    for partial in partials {
        for topic in partial.responses {
            match merged.responses.iter_mut().find(|t| t.name == topic.name) {
                Some(existing) => existing.partition_responses.extend(topic.partition_responses),
                None => merged.responses.push(topic),
            }
        }
    }
    merged
}

/// Concatenate partial list-offsets responses, folding same-topic entries
/// together
fn merge_list_offsets(partials: Vec<ListOffsetsResponse>) -> ListOffsetsResponse {
    let mut merged = ListOffsetsResponse::default();
    for partial in partials {
        for topic in partial.topics {
            match merged.topics.iter_mut().find(|t| t.name == topic.name) {
                Some(existing) => existing.partitions.extend(topic.partitions),
                None => merged.topics.push(topic),
            }
        }
    }
    merged
}
