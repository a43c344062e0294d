//! Runs against a real cluster, see `maybe_skip_kafka_integration!`.

mod test_helpers;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use kafka_console::{
    admin::{AdminClient, AdminConfig, AdminConnector, NewTopic, WireConnector},
    client::{error::ProtocolError, ClientBuilder},
    service::{
        ConnectionManager, CreateTopic, MetadataAggregator, SimulatedMetrics, TopicCommands,
    },
};

use crate::test_helpers::{maybe_start_logging, random_topic_name};

#[ignore]
#[tokio::test]
async fn wire_admin_round_trip() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let admin = WireConnector
        .connect(&AdminConfig::new(test_cfg.bootstrap_brokers))
        .await
        .unwrap();

    let cluster = admin.describe_cluster().await.unwrap();
    assert!(!cluster.brokers.is_empty());
    assert!(cluster.controller_id.is_some());

    let topic = random_topic_name();
    admin
        .create_topic(NewTopic {
            name: topic.clone(),
            num_partitions: 2,
            replication_factor: 1,
            configs: BTreeMap::from([("cleanup.policy".to_string(), "compact".to_string())]),
            timeout: Duration::from_secs(5),
        })
        .await
        .unwrap();

    let err = admin
        .create_topic(NewTopic {
            name: topic.clone(),
            num_partitions: 1,
            replication_factor: 1,
            configs: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        })
        .await
        .unwrap_err();
    assert_eq!(err.protocol_error(), Some(ProtocolError::TopicAlreadyExists));

    assert!(admin.list_topics().await.unwrap().contains(&topic));

    let metadata = admin
        .fetch_topic_metadata(&[topic.clone()])
        .await
        .unwrap();
    assert_eq!(metadata[0].partitions.len(), 2);

    admin
        .alter_topic_config(
            &topic,
            BTreeMap::from([("retention.ms".to_string(), "60000".to_string())]),
        )
        .await
        .unwrap();
    let config = admin.describe_topic_config(&topic).await.unwrap();
    assert_eq!(config["retention.ms"], "60000");
    assert_eq!(config["cleanup.policy"], "compact");

    admin
        .delete_topic(&topic, Duration::from_secs(5))
        .await
        .unwrap();
    admin.close().await.unwrap();
}

#[ignore]
#[tokio::test]
async fn service_against_cluster() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let connections = Arc::new(ConnectionManager::new(
        Arc::new(WireConnector),
        AdminConfig::new(vec![]),
    ));
    connections
        .connect(test_cfg.bootstrap_brokers, None)
        .await
        .unwrap();

    let aggregator = MetadataAggregator::new(
        Arc::clone(&connections),
        Default::default(),
        Arc::new(SimulatedMetrics::new()),
    );
    let commands = TopicCommands::new(Arc::clone(&connections));

    let topic = random_topic_name();
    commands
        .create_topic(CreateTopic {
            name: topic.clone(),
            partitions: 3,
            replication_factor: 1,
            config: BTreeMap::new(),
        })
        .await
        .unwrap();

    let details = aggregator.topic_details(&topic).await.unwrap();
    assert_eq!(details.topic.partitions, 3);
    assert_eq!(details.partition_details.len(), 3);

    let overview = aggregator.cluster_overview().await.unwrap();
    assert!(overview.topics_count >= 1);

    commands.delete_topic(&topic).await.unwrap();
    connections.disconnect().await;
    assert!(!connections.is_active());
}

#[ignore]
#[tokio::test]
async fn client_reports_brokers() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let client = ClientBuilder::new(test_cfg.bootstrap_brokers)
        .build()
        .await
        .unwrap();

    let brokers = client.brokers();
    assert!(!brokers.is_empty());
    assert!(brokers.windows(2).all(|w| w[0].id < w[1].id));
    client.close().await;
}
