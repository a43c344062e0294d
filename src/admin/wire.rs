use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::debug;

use super::{AdminClient, AdminConfig, AdminConnector, AdminError, NewTopic};
use crate::{
    client::{controller::ControllerClient, Client, ClientBuilder, ClusterDescription, ConfigEntry},
    topic::Topic,
};

/// Opens [`WireAdmin`] clients speaking the Kafka protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireConnector;

#[async_trait]
impl AdminConnector for WireConnector {
    async fn connect(&self, config: &AdminConfig) -> Result<Arc<dyn AdminClient>, AdminError> {
        let client = ClientBuilder::new(config.bootstrap_servers.clone())
            .client_id(config.client_id.as_str())
            .connect_timeout(config.connect_timeout)
            .request_timeout(config.request_timeout)
            .backoff_config(config.retry.clone())
            .build()
            .await?;

        Ok(Arc::new(WireAdmin::new(client)))
    }
}

/// [`AdminClient`] backed by [`Client`].
#[derive(Debug)]
pub struct WireAdmin {
    client: Client,
    controller: ControllerClient,
}

impl WireAdmin {
    pub fn new(client: Client) -> Self {
        let controller = client.controller_client();
        Self { client, controller }
    }
}

/// Int conversion for timeouts sent on the wire.
fn timeout_ms(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// Dynamic, readable entries that a full replacement must carry over.
fn overridden(entries: Vec<ConfigEntry>) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .filter(|e| !e.is_default && !e.read_only)
        .filter_map(|e| e.value.map(|value| (e.name, value)))
        .collect()
}

#[async_trait]
impl AdminClient for WireAdmin {
    async fn describe_cluster(&self) -> Result<ClusterDescription, AdminError> {
        Ok(self.client.describe_cluster().await?)
    }

    async fn list_topics(&self) -> Result<Vec<String>, AdminError> {
        Ok(self
            .client
            .list_topics()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    async fn fetch_topic_metadata(&self, topics: &[String]) -> Result<Vec<Topic>, AdminError> {
        Ok(self.client.fetch_metadata(topics).await?)
    }

    async fn describe_topic_config(
        &self,
        topic: &str,
    ) -> Result<BTreeMap<String, String>, AdminError> {
        Ok(self
            .client
            .describe_topic_config(topic)
            .await?
            .into_iter()
            .filter_map(|e| e.value.map(|value| (e.name, value)))
            .collect())
    }

    async fn create_topic(&self, topic: NewTopic) -> Result<(), AdminError> {
        Ok(self
            .controller
            .create_topic(
                topic.name,
                topic.num_partitions,
                topic.replication_factor,
                topic.configs,
                timeout_ms(topic.timeout),
            )
            .await?)
    }

    async fn delete_topic(&self, topic: &str, timeout: Duration) -> Result<(), AdminError> {
        Ok(self
            .controller
            .delete_topic(topic, timeout_ms(timeout))
            .await?)
    }

    async fn alter_topic_config(
        &self,
        topic: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<(), AdminError> {
        // AlterConfigs replaces the whole dynamic set, so merge with what is there.
        // Sensitive values are never returned and cannot be carried over.
        let mut configs = overridden(self.client.describe_topic_config(topic).await?);
        debug!(
            topic,
            existing = configs.len(),
            updates = updates.len(),
            "Merging topic config"
        );
        configs.extend(updates);

        Ok(self.controller.alter_topic_config(topic, configs).await?)
    }

    async fn close(&self) -> Result<(), AdminError> {
        self.client.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: Option<&str>, is_default: bool, read_only: bool) -> ConfigEntry {
        ConfigEntry {
            name: name.to_string(),
            value: value.map(ToString::to_string),
            read_only,
            is_default,
            is_sensitive: false,
        }
    }

    #[test]
    fn only_dynamic_overrides_are_carried_over() {
        let got = overridden(vec![
            entry("retention.ms", Some("1000"), false, false),
            entry("cleanup.policy", Some("delete"), true, false),
            entry("segment.bytes", Some("1"), false, true),
            entry("secret", None, false, false),
        ]);

        assert_eq!(
            got,
            BTreeMap::from([("retention.ms".to_string(), "1000".to_string())])
        );
    }

    #[test]
    fn timeout_saturates() {
        assert_eq!(timeout_ms(Duration::from_secs(30)), 30_000);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX / 1000)), i32::MAX);
    }
}
