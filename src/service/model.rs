//! UI-facing projections of cluster state.
//!
//! Everything here is recomputed per request and serialized with camelCase
//! field names.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The connection the server currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub bootstrap_servers: Vec<String>,
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub cluster_id: Option<String>,
    pub controller_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A cluster as the operator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConnection {
    pub id: String,
    pub name: String,
    pub bootstrap_servers: Vec<String>,
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerStatus {
    Online,
    Offline,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerMetrics {
    pub disk_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub requests_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerInfo {
    pub id: i32,
    pub host: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
    pub status: BrokerStatus,
    pub is_controller: bool,

    /// Estimated when only a sample of topics was inspected.
    pub topic_count: u64,

    /// Estimated when only a sample of topics was inspected.
    pub partition_count: u64,
    pub config: BTreeMap<String, String>,
    pub metrics: BrokerMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Active,
    Deleting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMetrics {
    pub message_count: u64,
    pub size_bytes: u64,
    pub consumer_lag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicInfo {
    pub name: String,
    pub partitions: u32,
    pub replication_factor: u32,
    pub config: BTreeMap<String, String>,
    pub metrics: TopicMetrics,
    pub status: TopicStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub partition: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDetails {
    #[serde(flatten)]
    pub topic: TopicInfo,
    pub partition_details: Vec<PartitionInfo>,
}

/// All topics plus cluster-wide averages.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicListing {
    pub topics: Vec<TopicInfo>,
    pub avg_partitions: f64,
    pub avg_replication_factor: f64,
}

impl TopicListing {
    pub fn new(topics: Vec<TopicInfo>) -> Self {
        let avg = |f: fn(&TopicInfo) -> u32| {
            if topics.is_empty() {
                0.0
            } else {
                let sum: f64 = topics.iter().map(|t| f64::from(f(t))).sum();
                round2(sum / topics.len() as f64)
            }
        };
        let avg_partitions = avg(|t| t.partitions);
        let avg_replication_factor = avg(|t| t.replication_factor);

        Self {
            topics,
            avg_partitions,
            avg_replication_factor,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl ClusterStatus {
    pub fn from_brokers(online: u64, total: u64) -> Self {
        if total == 0 {
            Self::Critical
        } else if online == total {
            Self::Healthy
        } else if online * 2 > total {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOverview {
    pub brokers_online: u64,
    pub brokers_total: u64,
    pub topics_count: u64,
    pub partitions_count: u64,
    pub consumer_groups_count: u64,
    pub messages_per_second: f64,
    pub status: ClusterStatus,
}

impl ClusterOverview {
    /// The overview reported while no cluster is connected.
    pub fn unknown() -> Self {
        Self {
            brokers_online: 0,
            brokers_total: 0,
            topics_count: 0,
            partitions_count: 0,
            consumer_groups_count: 0,
            messages_per_second: 0.0,
            status: ClusterStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn topic(partitions: u32, replication_factor: u32) -> TopicInfo {
        TopicInfo {
            name: "t".to_string(),
            partitions,
            replication_factor,
            config: BTreeMap::new(),
            metrics: TopicMetrics::default(),
            status: TopicStatus::Active,
        }
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(ClusterStatus::from_brokers(3, 3), ClusterStatus::Healthy);
        assert_eq!(ClusterStatus::from_brokers(2, 3), ClusterStatus::Warning);
        assert_eq!(ClusterStatus::from_brokers(1, 2), ClusterStatus::Critical);
        assert_eq!(ClusterStatus::from_brokers(0, 0), ClusterStatus::Critical);
    }

    #[test]
    fn averages() {
        let empty = TopicListing::new(vec![]);
        assert_eq!(empty.avg_partitions, 0.0);
        assert_eq!(empty.avg_replication_factor, 0.0);

        let listing = TopicListing::new(vec![topic(1, 1), topic(2, 3), topic(3, 3)]);
        assert_eq!(listing.avg_partitions, 2.0);
        assert_eq!(listing.avg_replication_factor, 2.33);
    }

    #[test]
    fn camel_case_on_the_wire() {
        let value = serde_json::to_value(ClusterOverview::unknown()).unwrap();
        assert_eq!(
            value,
            json!({
                "brokersOnline": 0,
                "brokersTotal": 0,
                "topicsCount": 0,
                "partitionsCount": 0,
                "consumerGroupsCount": 0,
                "messagesPerSecond": 0.0,
                "status": "unknown",
            })
        );
    }

    #[test]
    fn details_flatten_topic() {
        let details = TopicDetails {
            topic: topic(1, 1),
            partition_details: vec![PartitionInfo {
                partition: 0,
                leader: 1,
                replicas: vec![1],
                isr: vec![1],
            }],
        };
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["replicationFactor"], 1);
        assert_eq!(value["partitionDetails"][0]["isr"], json!([1]));
    }
}
