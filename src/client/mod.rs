use std::{collections::BTreeMap, sync::Arc, time::Duration};

use crate::{
    backoff::{BackoffConfig, ErrorOrThrottle},
    connection::{Broker, BrokerCache, BrokerConnector, ConnectionConfig},
    protocol::messages::{
        DescribeConfigsRequest, DescribeConfigsResource, DescribeConfigsResourceResult,
        MetadataResponse, MetadataResponseTopic, RESOURCE_TYPE_TOPIC,
    },
    topic::{Partition, Topic},
};

pub mod controller;
pub mod error;

use controller::{maybe_retry, ControllerClient};
use error::{Error, ProtocolError, RequestContext, Result};

/// Client ID sent when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "kafka-console";

/// Builder for [`Client`].
pub struct ClientBuilder {
    bootstrap_brokers: Vec<String>,
    client_id: Option<Arc<str>>,
    connection_config: ConnectionConfig,
    backoff_config: BackoffConfig,
}

impl ClientBuilder {
    /// Create a new [`ClientBuilder`] with the list of bootstrap brokers
    pub fn new(bootstrap_brokers: Vec<String>) -> Self {
        Self {
            bootstrap_brokers,
            client_id: None,
            connection_config: ConnectionConfig::default(),
            backoff_config: BackoffConfig::default(),
        }
    }

    /// Sets client ID.
    pub fn client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Time allowed for establishing a TCP connection to a broker.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connection_config.connect_timeout = timeout;
        self
    }

    /// Time allowed for a broker to answer a single request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.connection_config.request_timeout = timeout;
        self
    }

    /// Set maximum size (in bytes) of message frames that can be received from a broker.
    ///
    /// Setting this too small will result in failures all over the place since
    /// metadata requests of large clusters cannot be handled any longer.
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.connection_config.max_message_size = max_message_size;
        self
    }

    /// Retry policy for requests failing with recoverable errors.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    /// Build [`Client`].
    ///
    /// Fetches the cluster metadata once, so an unreachable cluster fails here.
    pub async fn build(self) -> Result<Client> {
        let brokers = Arc::new(BrokerConnector::new(
            self.bootstrap_brokers,
            self.client_id
                .unwrap_or_else(|| Arc::from(DEFAULT_CLIENT_ID)),
            self.connection_config,
        ));
        brokers.refresh_metadata().await?;

        Ok(Client {
            brokers,
            backoff_config: Arc::new(self.backoff_config),
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

/// Cluster identity and membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    pub cluster_id: Option<String>,
    pub controller_id: Option<i32>,
    pub brokers: Vec<Broker>,
}

/// One configuration entry of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub value: Option<String>,
    pub read_only: bool,
    pub is_default: bool,
    pub is_sensitive: bool,
}

impl From<DescribeConfigsResourceResult> for ConfigEntry {
    fn from(c: DescribeConfigsResourceResult) -> Self {
        Self {
            name: c.name,
            value: c.value,
            read_only: c.read_only,
            is_default: c.is_default,
            is_sensitive: c.is_sensitive,
        }
    }
}

/// Top-level cluster-wide client.
///
/// This client can be used to query cluster-wide metadata and construct a
/// [`ControllerClient`] for mutations.
///
/// Must be constructed using [`ClientBuilder`].
#[derive(Debug)]
pub struct Client {
    brokers: Arc<BrokerConnector>,
    backoff_config: Arc<BackoffConfig>,
}

impl Client {
    /// Returns a client for performing certain cluster-wide operations.
    pub fn controller_client(&self) -> ControllerClient {
        ControllerClient::new(Arc::clone(&self.brokers), Arc::clone(&self.backoff_config))
    }

    /// Returns a list of brokers from cluster topology
    pub fn brokers(&self) -> Vec<Broker> {
        self.brokers.topology.get_brokers()
    }

    /// Cluster id, controller and brokers from a fresh metadata request.
    pub async fn describe_cluster(&self) -> Result<ClusterDescription> {
        let response = self.metadata(Some(vec![]), "describe_cluster").await?;

        Ok(ClusterDescription {
            cluster_id: response.cluster_id,
            controller_id: response.controller_id,
            brokers: response.brokers.iter().map(Broker::from).collect(),
        })
    }

    /// Returns a list of topics in the cluster
    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        // Do not use cached metadata, a topic created a moment ago must show up.
        let response = self.metadata(None, "list_topics").await?;

        Ok(response
            .topics
            .into_iter()
            .filter(|t| !matches!(t.is_internal, Some(true)))
            .map(topic_from_metadata)
            .collect())
    }

    /// Metadata of the named topics, in the order the broker returns them.
    ///
    /// Fails if any of the topics does not exist.
    pub async fn fetch_metadata(&self, topics: &[String]) -> Result<Vec<Topic>> {
        if topics.is_empty() {
            return Ok(vec![]);
        }

        let response = self.metadata(Some(topics.to_vec()), "fetch_metadata").await?;

        if let Some(missing) = topics
            .iter()
            .find(|name| !response.topics.iter().any(|t| &t.name == *name))
        {
            return Err(Error::server(
                ProtocolError::UnknownTopicOrPartition,
                None,
                RequestContext::Topic(missing.clone()),
            ));
        }

        response
            .topics
            .into_iter()
            .map(|t| match t.error {
                Some(protocol_error) => Err(Error::server(
                    protocol_error,
                    None,
                    RequestContext::Topic(t.name),
                )),
                None => Ok(topic_from_metadata(t)),
            })
            .collect()
    }

    /// All configuration entries of a topic.
    pub async fn describe_topic_config(&self, topic: &str) -> Result<Vec<ConfigEntry>> {
        let request = &DescribeConfigsRequest {
            resources: vec![DescribeConfigsResource {
                resource_type: RESOURCE_TYPE_TOPIC,
                resource_name: topic.to_string(),
                configuration_keys: None,
            }],
            include_synonyms: false,
        };

        let brokers = self.brokers.as_ref();
        maybe_retry(&self.backoff_config, brokers, "describe_configs", || async move {
            let (broker, gen) = BrokerCache::get(&brokers)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

            ErrorOrThrottle::check_throttle(Some(response.throttle_time_ms))?;

            let got = response.results.len();
            let result = match <[_; 1]>::try_from(response.results) {
                Ok([result]) => result,
                Err(_) => {
                    return Err(ErrorOrThrottle::Error((
                        Error::exactly_one_topic(got),
                        Some(gen),
                    )))
                }
            };

            if let Some(protocol_error) = result.error {
                return Err(ErrorOrThrottle::Error((
                    Error::server(
                        protocol_error,
                        result.error_message,
                        RequestContext::Topic(result.resource_name),
                    ),
                    Some(gen),
                )));
            }

            Ok(result.configs.into_iter().map(ConfigEntry::from).collect())
        })
        .await
    }

    /// Drops open broker connections.
    pub async fn close(&self) {
        self.brokers.close().await;
    }

    async fn metadata(
        &self,
        topics: Option<Vec<String>>,
        request_name: &'static str,
    ) -> Result<MetadataResponse> {
        let topics = &topics;
        let brokers = self.brokers.as_ref();

        maybe_retry(&self.backoff_config, brokers, request_name, || async move {
            let response = brokers
                .request_metadata(topics.clone())
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))?;

            ErrorOrThrottle::check_throttle(response.throttle_time_ms)?;

            Ok(response)
        })
        .await
    }
}

fn topic_from_metadata(t: MetadataResponseTopic) -> Topic {
    Topic {
        name: t.name,
        is_internal: t.is_internal.unwrap_or_default(),
        partitions: t
            .partitions
            .into_iter()
            .map(|p| {
                (
                    p.partition_index,
                    Partition {
                        leader_id: p.leader_id,
                        replica_nodes: p.replica_nodes,
                        isr_nodes: p.isr_nodes,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::MetadataResponsePartition;

    #[test]
    fn metadata_topic_conversion() {
        let topic = topic_from_metadata(MetadataResponseTopic {
            error: None,
            name: "orders".to_string(),
            is_internal: None,
            partitions: vec![MetadataResponsePartition {
                error: None,
                partition_index: 0,
                leader_id: 1,
                replica_nodes: vec![1, 2],
                isr_nodes: vec![1],
            }],
        });

        assert_eq!(topic.name, "orders");
        assert!(!topic.is_internal);
        assert_eq!(topic.replication_factor(), 2);
        assert_eq!(topic.partitions[&0].isr_nodes, vec![1]);
    }
}
