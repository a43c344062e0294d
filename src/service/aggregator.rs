//! UI-ready aggregates computed from live cluster metadata.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use futures::future::join_all;
use tracing::{debug, warn};

use super::{
    connection::ConnectionManager,
    error::{ServiceError, TopicCommandError},
    metrics::MetricsProvider,
    model::{
        BrokerInfo, BrokerStatus, ClusterOverview, ClusterStatus, PartitionInfo, TopicDetails,
        TopicInfo, TopicListing, TopicStatus,
    },
    sampling::SamplingStrategy,
};
use crate::{
    admin::{AdminClient, AdminError},
    client::error::ProtocolError,
    topic::Topic,
};

#[derive(Debug)]
pub struct MetadataAggregator {
    connections: Arc<ConnectionManager>,
    sampling: SamplingStrategy,
    metrics: Arc<dyn MetricsProvider>,
}

impl MetadataAggregator {
    pub fn new(
        connections: Arc<ConnectionManager>,
        sampling: SamplingStrategy,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            connections,
            sampling,
            metrics,
        }
    }

    pub async fn cluster_overview(&self) -> Result<ClusterOverview, ServiceError> {
        let admin = self.connections.admin()?;

        let (cluster, topics) = futures::try_join!(admin.describe_cluster(), admin.list_topics())
            .map_err(ServiceError::kafka("Failed to fetch cluster overview"))?;

        let brokers_total = cluster.brokers.len() as u64;
        // metadata only lists live brokers
        let brokers_online = brokers_total;
        let partitions_count = self.estimate_partitions(admin.as_ref(), &topics).await;

        Ok(ClusterOverview {
            brokers_online,
            brokers_total,
            topics_count: topics.len() as u64,
            partitions_count,
            consumer_groups_count: 0,
            messages_per_second: self.metrics.messages_per_second(),
            status: ClusterStatus::from_brokers(brokers_online, brokers_total),
        })
    }

    async fn estimate_partitions(&self, admin: &dyn AdminClient, topics: &[String]) -> u64 {
        let sample = self.sampling.partition_sample(topics);
        if sample.is_empty() {
            return 0;
        }

        match admin.fetch_topic_metadata(sample).await {
            Ok(metadata) => {
                let sampled: u64 = metadata.iter().map(|t| t.partitions.len() as u64).sum();
                debug!(
                    sampled_topics = sample.len(),
                    total_topics = topics.len(),
                    sampled_partitions = sampled,
                    "Estimated partition count",
                );
                SamplingStrategy::extrapolate(sampled, sample.len(), topics.len())
            }
            Err(e) => {
                warn!(%e, "Partition sampling failed, using fallback estimate");
                SamplingStrategy::fallback_partitions(topics.len())
            }
        }
    }

    pub async fn brokers(&self) -> Result<Vec<BrokerInfo>, ServiceError> {
        let admin = self.connections.admin()?;

        let (cluster, topics) = futures::try_join!(admin.describe_cluster(), admin.list_topics())
            .map_err(ServiceError::kafka("Failed to fetch brokers"))?;

        let sample = self.sampling.broker_sample(&topics);
        let counts = match admin.fetch_topic_metadata(sample).await {
            Ok(metadata) => {
                let mut counts = count_by_broker(&metadata);
                if sample.len() < topics.len() {
                    for c in counts.values_mut() {
                        c.topics = SamplingStrategy::extrapolate(c.topics, sample.len(), topics.len());
                        c.partitions =
                            SamplingStrategy::extrapolate(c.partitions, sample.len(), topics.len());
                    }
                }
                counts
            }
            Err(e) => {
                warn!(%e, "Broker sampling failed, reporting zero counts");
                HashMap::new()
            }
        };

        let mut brokers: Vec<_> = cluster
            .brokers
            .into_iter()
            .map(|b| {
                let c = counts.get(&b.id).copied().unwrap_or_default();
                BrokerInfo {
                    id: b.id,
                    host: b.host,
                    port: b.port,
                    rack: b.rack,
                    status: BrokerStatus::Online,
                    is_controller: cluster.controller_id == Some(b.id),
                    topic_count: c.topics,
                    partition_count: c.partitions,
                    config: BTreeMap::new(),
                    metrics: self.metrics.broker_metrics(b.id),
                }
            })
            .collect();
        brokers.sort_by_key(|b| b.id);

        Ok(brokers)
    }

    pub async fn topics(&self) -> Result<TopicListing, ServiceError> {
        let admin = self.connections.admin()?;

        let names = admin
            .list_topics()
            .await
            .map_err(ServiceError::kafka("Failed to fetch topics"))?;
        let metadata = admin
            .fetch_topic_metadata(&names)
            .await
            .map_err(ServiceError::kafka("Failed to fetch topic metadata"))?;

        let configs = join_all(
            metadata
                .iter()
                .map(|t| topic_config(admin.as_ref(), &t.name)),
        )
        .await;

        let mut topics: Vec<_> = metadata
            .iter()
            .zip(configs)
            .map(|(t, config)| self.topic_info(t, config))
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(TopicListing::new(topics))
    }

    pub async fn topic_details(&self, name: &str) -> Result<TopicDetails, ServiceError> {
        let admin = self.connections.admin()?;

        let topic = admin
            .fetch_topic_metadata(&[name.to_string()])
            .await
            .map_err(|e| match e.protocol_error() {
                Some(ProtocolError::UnknownTopicOrPartition) => {
                    ServiceError::Topic(TopicCommandError::NotFound {
                        name: name.to_string(),
                    })
                }
                _ => ServiceError::kafka("Failed to fetch topic details")(e),
            })?
            .into_iter()
            .next()
            .ok_or_else(|| TopicCommandError::NotFound {
                name: name.to_string(),
            })?;

        let config = topic_config(admin.as_ref(), &topic.name).await;

        Ok(TopicDetails {
            partition_details: topic
                .partitions
                .iter()
                .map(|(id, p)| PartitionInfo {
                    partition: *id,
                    leader: p.leader_id,
                    replicas: p.replica_nodes.clone(),
                    isr: p.isr_nodes.clone(),
                })
                .collect(),
            topic: self.topic_info(&topic, config),
        })
    }

    fn topic_info(&self, topic: &Topic, config: BTreeMap<String, String>) -> TopicInfo {
        TopicInfo {
            name: topic.name.clone(),
            partitions: topic.partitions.len() as u32,
            replication_factor: topic.replication_factor() as u32,
            config,
            metrics: self.metrics.topic_metrics(&topic.name),
            status: TopicStatus::Active,
        }
    }
}

/// Topic config, empty when it cannot be read.
async fn topic_config(admin: &dyn AdminClient, topic: &str) -> BTreeMap<String, String> {
    admin
        .describe_topic_config(topic)
        .await
        .unwrap_or_else(|e: AdminError| {
            warn!(%e, topic, "Failed to fetch topic config");
            BTreeMap::new()
        })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BrokerCounts {
    topics: u64,
    partitions: u64,
}

/// Replica placement per broker: one per hosted partition, one per topic.
fn count_by_broker(topics: &[Topic]) -> HashMap<i32, BrokerCounts> {
    let mut counts: HashMap<i32, BrokerCounts> = HashMap::new();

    for topic in topics {
        let mut hosting = HashSet::new();
        for partition in topic.partitions.values() {
            for broker in &partition.replica_nodes {
                counts.entry(*broker).or_default().partitions += 1;
                hosting.insert(*broker);
            }
        }
        for broker in hosting {
            counts.entry(broker).or_default().topics += 1;
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::client::error::ProtocolError;
    use crate::{service::metrics::SimulatedMetrics, testing::*};

    async fn aggregator(cluster: Arc<FakeCluster>, sampling: SamplingStrategy) -> MetadataAggregator {
        MetadataAggregator::new(
            connected(cluster).await,
            sampling,
            Arc::new(SimulatedMetrics::with_seed(3)),
        )
    }

    #[tokio::test]
    async fn not_connected_never_touches_admin() {
        let cluster = FakeCluster::with_brokers(1);
        let (manager, _connector) = manager(Arc::clone(&cluster));
        let aggregator = MetadataAggregator::new(
            Arc::new(manager),
            SamplingStrategy::default(),
            Arc::new(SimulatedMetrics::with_seed(1)),
        );

        assert_matches!(aggregator.cluster_overview().await, Err(ServiceError::NotConnected));
        assert_matches!(aggregator.brokers().await, Err(ServiceError::NotConnected));
        assert_matches!(aggregator.topics().await, Err(ServiceError::NotConnected));
        assert_matches!(
            aggregator.topic_details("t").await,
            Err(ServiceError::NotConnected)
        );
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn overview_counts_exactly_below_threshold() {
        let cluster = FakeCluster::with_brokers(3);
        cluster.add_topic("a", 3, 2);
        cluster.add_topic("b", 5, 1);
        let aggregator = aggregator(cluster, SamplingStrategy::default()).await;

        let overview = aggregator.cluster_overview().await.unwrap();
        assert_eq!(overview.brokers_total, 3);
        assert_eq!(overview.brokers_online, 3);
        assert_eq!(overview.topics_count, 2);
        assert_eq!(overview.partitions_count, 8);
        assert_eq!(overview.consumer_groups_count, 0);
        assert_eq!(overview.status, ClusterStatus::Healthy);
    }

    #[tokio::test]
    async fn overview_extrapolates_above_threshold() {
        let cluster = FakeCluster::with_brokers(1);
        // sorted names: the two sampled topics have 2 and 4 partitions
        cluster.add_topic("t0", 2, 1);
        cluster.add_topic("t1", 4, 1);
        cluster.add_topic("t2", 100, 1);
        cluster.add_topic("t3", 100, 1);
        let sampling = SamplingStrategy {
            threshold: 2,
            sample_size: 2,
            broker_sample_size: 2,
        };
        let aggregator = aggregator(cluster, sampling).await;

        let overview = aggregator.cluster_overview().await.unwrap();
        assert_eq!(overview.partitions_count, 12);
    }

    #[tokio::test]
    async fn overview_falls_back_when_sampling_fails() {
        let cluster = FakeCluster::with_brokers(1);
        cluster.add_topic("a", 10, 1);
        cluster.add_topic("b", 10, 1);
        cluster.fail("fetch_topic_metadata", FakeFailure::Timeout);
        let aggregator = aggregator(cluster, SamplingStrategy::default()).await;

        let overview = aggregator.cluster_overview().await.unwrap();
        assert_eq!(overview.partitions_count, 6);
    }

    #[tokio::test]
    async fn overview_fails_on_cluster_error() {
        let cluster = FakeCluster::with_brokers(1);
        let aggregator = aggregator(Arc::clone(&cluster), SamplingStrategy::default()).await;
        cluster.fail(
            "list_topics",
            FakeFailure::Kafka(ProtocolError::ClusterAuthorizationFailed),
        );

        let err = aggregator.cluster_overview().await.unwrap_err();
        assert_matches!(err, ServiceError::Kafka { .. });
        assert!(err.to_string().starts_with("Failed to fetch cluster overview: "));
    }

    #[tokio::test]
    async fn broker_counts() {
        let cluster = FakeCluster::with_brokers(3);
        // replicas of "a": [1,2] [2,3] [3,1]
        cluster.add_topic("a", 3, 2);
        // replicas of "b": [1]
        cluster.add_topic("b", 1, 1);
        let aggregator = aggregator(cluster, SamplingStrategy::default()).await;

        let brokers = aggregator.brokers().await.unwrap();
        let summary: Vec<_> = brokers
            .iter()
            .map(|b| (b.id, b.is_controller, b.topic_count, b.partition_count))
            .collect();
        assert_eq!(summary, vec![(1, true, 2, 3), (2, false, 1, 2), (3, false, 1, 2)]);
    }

    #[tokio::test]
    async fn broker_counts_are_scaled_from_sample() {
        let cluster = FakeCluster::with_brokers(1);
        for i in 0..4 {
            cluster.add_topic(&format!("t{i}"), 2, 1);
        }
        let sampling = SamplingStrategy {
            broker_sample_size: 1,
            ..Default::default()
        };
        let aggregator = aggregator(cluster, sampling).await;

        let brokers = aggregator.brokers().await.unwrap();
        assert_eq!(brokers[0].topic_count, 4);
        assert_eq!(brokers[0].partition_count, 8);
    }

    #[tokio::test]
    async fn broker_sampling_failure_degrades_to_zero() {
        let cluster = FakeCluster::with_brokers(2);
        cluster.add_topic("a", 2, 2);
        cluster.fail("fetch_topic_metadata", FakeFailure::Timeout);
        let aggregator = aggregator(cluster, SamplingStrategy::default()).await;

        let brokers = aggregator.brokers().await.unwrap();
        assert_eq!(brokers.len(), 2);
        assert!(brokers.iter().all(|b| b.topic_count == 0 && b.partition_count == 0));
    }

    #[tokio::test]
    async fn empty_topic_list() {
        let aggregator = aggregator(FakeCluster::with_brokers(1), SamplingStrategy::default()).await;

        let listing = aggregator.topics().await.unwrap();
        assert!(listing.topics.is_empty());
        assert_eq!(listing.avg_partitions, 0.0);
        assert_eq!(listing.avg_replication_factor, 0.0);
    }

    #[tokio::test]
    async fn topics_with_best_effort_config() {
        let cluster = FakeCluster::with_brokers(3);
        cluster.add_topic("b", 2, 3);
        cluster.add_topic("a", 4, 1);
        cluster.set_config("a", &[("retention.ms", "1000")]);
        let aggregator = aggregator(Arc::clone(&cluster), SamplingStrategy::default()).await;

        let listing = aggregator.topics().await.unwrap();
        let names: Vec<_> = listing.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(listing.topics[0].config["retention.ms"], "1000");
        assert_eq!(listing.topics[1].replication_factor, 3);
        assert_eq!(listing.avg_partitions, 3.0);
        assert_eq!(listing.avg_replication_factor, 2.0);

        cluster.fail("describe_topic_config", FakeFailure::Timeout);
        let listing = aggregator.topics().await.unwrap();
        assert!(listing.topics.iter().all(|t| t.config.is_empty()));
    }

    #[tokio::test]
    async fn details_of_missing_topic() {
        let aggregator = aggregator(FakeCluster::with_brokers(1), SamplingStrategy::default()).await;

        let err = aggregator.topic_details("nope").await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::Topic(TopicCommandError::NotFound { name }) if name == "nope"
        );
    }

    #[tokio::test]
    async fn details_list_partitions() {
        let cluster = FakeCluster::with_brokers(2);
        cluster.add_topic("a", 2, 2);
        let aggregator = aggregator(cluster, SamplingStrategy::default()).await;

        let details = aggregator.topic_details("a").await.unwrap();
        assert_eq!(details.topic.partitions, 2);
        assert_eq!(
            details.partition_details[1],
            PartitionInfo {
                partition: 1,
                leader: 2,
                replicas: vec![2, 1],
                isr: vec![2, 1],
            }
        );
    }
}
