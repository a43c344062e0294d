//! Validated topic mutations.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tracing::{debug, info};

use super::{
    connection::ConnectionManager,
    error::{ServiceError, TopicCommandError},
};
use crate::admin::{AdminClient, NewTopic};

/// Longest topic name Kafka accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// How long the controller may take to finish a create or delete.
pub const TOPIC_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Checks a topic name against Kafka's naming rules.
pub fn validate_topic_name(name: &str) -> Result<(), TopicCommandError> {
    if name.is_empty() {
        return Err(TopicCommandError::EmptyName);
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err(TopicCommandError::NameTooLong { len: name.len() });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(TopicCommandError::InvalidCharacters);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTopic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    pub config: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct TopicCommands {
    connections: Arc<ConnectionManager>,
}

impl TopicCommands {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    pub async fn create_topic(&self, request: CreateTopic) -> Result<(), ServiceError> {
        let admin = self.connections.admin()?;
        debug!(topic = %request.name, "Validating topic creation");

        if let Err(e) = validate_topic_name(&request.name) {
            info!(topic = %request.name, %e, "Rejected topic creation");
            return Err(e.into());
        }

        if topic_exists(admin.as_ref(), &request.name).await? {
            info!(topic = %request.name, "Rejected topic creation, topic exists");
            return Err(TopicCommandError::AlreadyExists { name: request.name }.into());
        }

        let brokers = admin
            .describe_cluster()
            .await
            .map_err(ServiceError::kafka("Failed to describe cluster"))?
            .brokers
            .len();
        if usize::try_from(request.replication_factor).map_or(true, |rf| rf > brokers) {
            info!(
                topic = %request.name,
                replication_factor = request.replication_factor,
                brokers,
                "Rejected topic creation, replication factor too high",
            );
            return Err(TopicCommandError::ReplicationFactorTooHigh {
                requested: request.replication_factor,
                brokers,
            }
            .into());
        }

        info!(
            topic = %request.name,
            partitions = request.partitions,
            replication_factor = request.replication_factor,
            "Creating topic",
        );
        let name = request.name.clone();
        admin
            .create_topic(NewTopic {
                name: request.name,
                num_partitions: request.partitions,
                replication_factor: request.replication_factor,
                configs: request.config,
                timeout: TOPIC_OPERATION_TIMEOUT,
            })
            .await
            .map_err(ServiceError::rejected(&name, "Failed to create topic"))?;

        info!(topic = %name, "Created topic");
        Ok(())
    }

    pub async fn delete_topic(&self, name: &str) -> Result<(), ServiceError> {
        let admin = self.connections.admin()?;
        debug!(topic = name, "Validating topic deletion");

        if !topic_exists(admin.as_ref(), name).await? {
            info!(topic = name, "Rejected topic deletion, no such topic");
            return Err(TopicCommandError::NotFound {
                name: name.to_string(),
            }
            .into());
        }

        info!(topic = name, "Deleting topic");
        admin
            .delete_topic(name, TOPIC_OPERATION_TIMEOUT)
            .await
            .map_err(ServiceError::rejected(name, "Failed to delete topic"))?;

        info!(topic = name, "Deleted topic");
        Ok(())
    }

    pub async fn update_topic_config(
        &self,
        name: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<(), ServiceError> {
        let admin = self.connections.admin()?;
        debug!(topic = name, keys = updates.len(), "Validating topic config update");

        if !topic_exists(admin.as_ref(), name).await? {
            info!(topic = name, "Rejected topic config update, no such topic");
            return Err(TopicCommandError::NotFound {
                name: name.to_string(),
            }
            .into());
        }

        info!(topic = name, keys = ?updates.keys().collect::<Vec<_>>(), "Updating topic config");
        admin
            .alter_topic_config(name, updates)
            .await
            .map_err(ServiceError::rejected(name, "Failed to update topic config"))?;

        Ok(())
    }
}

/// Fresh existence check, never cached.
async fn topic_exists(admin: &dyn AdminClient, name: &str) -> Result<bool, ServiceError> {
    let topics = admin
        .list_topics()
        .await
        .map_err(ServiceError::kafka("Failed to list topics"))?;
    Ok(topics.iter().any(|t| t == name))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;
    use crate::admin::AdminError;
    use crate::client::error::ProtocolError;
    use crate::testing::*;

    fn create(name: &str, replication_factor: i16) -> CreateTopic {
        CreateTopic {
            name: name.to_string(),
            partitions: 3,
            replication_factor,
            config: BTreeMap::from([("cleanup.policy".to_string(), "compact".to_string())]),
        }
    }

    #[tokio::test]
    async fn creates_valid_topic() {
        let cluster = FakeCluster::with_brokers(3);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        commands.create_topic(create("orders.v1", 3)).await.unwrap();

        assert!(cluster.has_topic("orders.v1"));
        assert_eq!(cluster.count("create_topic"), 1);
        assert_eq!(cluster.config("orders.v1")["cleanup.policy"], "compact");
    }

    #[tokio::test]
    async fn invalid_name_sends_no_rpc() {
        let cluster = FakeCluster::with_brokers(1);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);
        let before = cluster.calls().len();

        let err = commands.create_topic(create("My Topic!", 1)).await.unwrap_err();
        assert_matches!(err, ServiceError::Topic(TopicCommandError::InvalidCharacters));

        let err = commands
            .create_topic(create(&"a".repeat(250), 1))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::Topic(TopicCommandError::NameTooLong { len: 250 })
        );

        assert_eq!(cluster.calls().len(), before);
    }

    #[tokio::test]
    async fn duplicate_is_rejected() {
        let cluster = FakeCluster::with_brokers(1);
        cluster.add_topic("orders", 1, 1);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        let err = commands.create_topic(create("orders", 1)).await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::Topic(TopicCommandError::AlreadyExists { name }) if name == "orders"
        );
        assert_eq!(cluster.count("create_topic"), 0);
    }

    #[tokio::test]
    async fn replication_factor_above_broker_count() {
        let cluster = FakeCluster::with_brokers(2);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        let err = commands.create_topic(create("orders", 3)).await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::Topic(TopicCommandError::ReplicationFactorTooHigh {
                requested: 3,
                brokers: 2
            })
        );
        assert_eq!(cluster.count("create_topic"), 0);
    }

    #[tokio::test]
    async fn commands_need_connection() {
        let cluster = FakeCluster::with_brokers(1);
        let (manager, _connector) = manager(Arc::clone(&cluster));
        let commands = TopicCommands::new(Arc::new(manager));

        assert_matches!(
            commands.create_topic(create("a", 1)).await,
            Err(ServiceError::NotConnected)
        );
        assert_matches!(commands.delete_topic("a").await, Err(ServiceError::NotConnected));
        assert_matches!(
            commands.update_topic_config("a", BTreeMap::new()).await,
            Err(ServiceError::NotConnected)
        );
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_checks_existence() {
        let cluster = FakeCluster::with_brokers(1);
        cluster.add_topic("orders", 1, 1);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        let err = commands.delete_topic("missing").await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::Topic(TopicCommandError::NotFound { name }) if name == "missing"
        );
        assert_eq!(cluster.count("delete_topic"), 0);

        commands.delete_topic("orders").await.unwrap();
        assert!(!cluster.has_topic("orders"));
    }

    #[tokio::test]
    async fn kafka_rejection_passes_through() {
        let cluster = FakeCluster::with_brokers(1);
        cluster.add_topic("orders", 1, 1);
        cluster.fail(
            "alter_topic_config",
            FakeFailure::Kafka(ProtocolError::InvalidConfig),
        );
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        let err = commands
            .update_topic_config(
                "orders",
                BTreeMap::from([("retention.ms".to_string(), "x".to_string())]),
            )
            .await
            .unwrap_err();
        assert_matches!(
            &err,
            ServiceError::Topic(TopicCommandError::Rejected { name, source })
                if name == "orders" && source.protocol_error() == Some(ProtocolError::InvalidConfig)
        );
        assert_eq!(err.to_string(), "Configuration is invalid.");
    }

    #[tokio::test]
    async fn lost_cluster_is_not_a_rejection() {
        let cluster = FakeCluster::with_brokers(1);
        cluster.add_topic("orders", 1, 1);
        cluster.fail("create_topic", FakeFailure::Timeout);
        cluster.fail("delete_topic", FakeFailure::Timeout);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        let err = commands.create_topic(create("payments", 1)).await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::Kafka {
                context: "Failed to create topic",
                source: AdminError::Timeout(_)
            }
        );

        let err = commands.delete_topic("orders").await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::Kafka {
                context: "Failed to delete topic",
                source: AdminError::Timeout(_)
            }
        );
    }

    #[tokio::test]
    async fn update_config_merges() {
        let cluster = FakeCluster::with_brokers(1);
        cluster.add_topic("orders", 1, 1);
        cluster.set_config("orders", &[("cleanup.policy", "delete")]);
        let commands = TopicCommands::new(connected(Arc::clone(&cluster)).await);

        commands
            .update_topic_config(
                "orders",
                BTreeMap::from([("retention.ms".to_string(), "1000".to_string())]),
            )
            .await
            .unwrap();

        let config = cluster.config("orders");
        assert_eq!(config["retention.ms"], "1000");
        assert_eq!(config["cleanup.policy"], "delete");
    }

    proptest! {
        #[test]
        fn valid_names_pass(name in "[A-Za-z0-9._-]{1,249}") {
            prop_assert!(validate_topic_name(&name).is_ok());
        }

        #[test]
        fn names_with_other_characters_fail(
            prefix in "[a-z]{0,10}",
            bad in "[ !@#$%^&*()+=/\\\\:;,?]",
            suffix in "[a-z]{0,10}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(matches!(
                validate_topic_name(&name),
                Err(TopicCommandError::InvalidCharacters)
            ));
        }

        #[test]
        fn long_names_fail(name in "[a-z]{250,300}") {
            let too_long = matches!(
                validate_topic_name(&name),
                Err(TopicCommandError::NameTooLong { .. })
            );
            prop_assert!(too_long);
        }
    }
}
