//! In-memory cluster standing in for the admin client.
//!
//! Compiled for unit tests and, with the `test-utils` feature, for the
//! integration tests under `tests/`.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    admin::{AdminClient, AdminConfig, AdminConnector, AdminError, NewTopic},
    client::{error::ProtocolError, ClusterDescription},
    connection::Broker,
    service::ConnectionManager,
    topic::{Partition, Topic},
};

/// A failure the fake injects, rebuilt on every call.
#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Timeout,
    Kafka(ProtocolError),
}

impl FakeFailure {
    fn error(self) -> AdminError {
        match self {
            Self::Timeout => AdminError::Timeout("request timed out".to_string()),
            Self::Kafka(error) => AdminError::Kafka {
                error,
                message: None,
                context: "fake".to_string(),
            },
        }
    }
}

/// Cluster state shared by every admin client a [`FakeConnector`] opens.
///
/// Every admin call is recorded by name; [`fail`](Self::fail) makes a call
/// fail until [`heal`](Self::heal) is called.
#[derive(Debug, Default)]
pub struct FakeCluster {
    brokers: Mutex<Vec<Broker>>,
    topics: Mutex<BTreeMap<String, Topic>>,
    configs: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    created: Mutex<Vec<NewTopic>>,
    failures: Mutex<BTreeMap<&'static str, FakeFailure>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeCluster {
    pub fn with_brokers(n: i32) -> Arc<Self> {
        let cluster = Self::default();
        *cluster.brokers.lock() = (1..=n)
            .map(|id| Broker {
                id,
                host: format!("kafka-{id}"),
                port: 9092,
                rack: None,
            })
            .collect();
        Arc::new(cluster)
    }

    /// Adds a topic whose replicas rotate over the brokers.
    pub fn add_topic(&self, name: &str, partitions: i32, replication_factor: i32) {
        let n = self.brokers.lock().len() as i32;
        let topic = Topic {
            name: name.to_string(),
            is_internal: false,
            partitions: (0..partitions)
                .map(|p| {
                    let replicas: Vec<i32> =
                        (0..replication_factor).map(|r| (p + r) % n + 1).collect();
                    (
                        p,
                        Partition {
                            leader_id: replicas[0],
                            isr_nodes: replicas.clone(),
                            replica_nodes: replicas,
                        },
                    )
                })
                .collect(),
        };
        self.topics.lock().insert(name.to_string(), topic);
    }

    pub fn set_config(&self, topic: &str, config: &[(&str, &str)]) {
        self.configs.lock().insert(
            topic.to_string(),
            config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn config(&self, topic: &str) -> BTreeMap<String, String> {
        self.configs.lock().get(topic).cloned().unwrap_or_default()
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.lock().contains_key(name)
    }

    /// Topics accepted by `create_topic`, in order.
    pub fn created(&self) -> Vec<NewTopic> {
        self.created.lock().clone()
    }

    pub fn fail(&self, call: &'static str, failure: FakeFailure) {
        self.failures.lock().insert(call, failure);
    }

    pub fn heal(&self, call: &str) {
        self.failures.lock().remove(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    fn enter(&self, call: &'static str) -> Result<(), AdminError> {
        self.calls.lock().push(call);
        match self.failures.lock().get(call) {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }
}

fn unknown_topic(name: &str) -> AdminError {
    AdminError::Kafka {
        error: ProtocolError::UnknownTopicOrPartition,
        message: None,
        context: format!("topic \"{name}\""),
    }
}

#[derive(Debug)]
pub struct FakeAdmin {
    cluster: Arc<FakeCluster>,
    pub closed: AtomicUsize,
}

#[async_trait]
impl AdminClient for FakeAdmin {
    async fn describe_cluster(&self) -> Result<ClusterDescription, AdminError> {
        self.cluster.enter("describe_cluster")?;
        let brokers = self.cluster.brokers.lock().clone();
        Ok(ClusterDescription {
            cluster_id: Some("fake-cluster".to_string()),
            controller_id: brokers.first().map(|b| b.id),
            brokers,
        })
    }

    async fn list_topics(&self) -> Result<Vec<String>, AdminError> {
        self.cluster.enter("list_topics")?;
        Ok(self.cluster.topics.lock().keys().cloned().collect())
    }

    async fn fetch_topic_metadata(&self, topics: &[String]) -> Result<Vec<Topic>, AdminError> {
        self.cluster.enter("fetch_topic_metadata")?;
        let known = self.cluster.topics.lock();
        topics
            .iter()
            .map(|name| known.get(name).cloned().ok_or_else(|| unknown_topic(name)))
            .collect()
    }

    async fn describe_topic_config(
        &self,
        topic: &str,
    ) -> Result<BTreeMap<String, String>, AdminError> {
        self.cluster.enter("describe_topic_config")?;
        Ok(self.cluster.config(topic))
    }

    async fn create_topic(&self, topic: NewTopic) -> Result<(), AdminError> {
        self.cluster.enter("create_topic")?;
        if self.cluster.has_topic(&topic.name) {
            return Err(AdminError::Kafka {
                error: ProtocolError::TopicAlreadyExists,
                message: None,
                context: topic.name,
            });
        }
        self.cluster.add_topic(
            &topic.name,
            topic.num_partitions,
            i32::from(topic.replication_factor),
        );
        self.cluster
            .configs
            .lock()
            .insert(topic.name.clone(), topic.configs.clone());
        self.cluster.created.lock().push(topic);
        Ok(())
    }

    async fn delete_topic(&self, topic: &str, _timeout: Duration) -> Result<(), AdminError> {
        self.cluster.enter("delete_topic")?;
        self.cluster
            .topics
            .lock()
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| unknown_topic(topic))
    }

    /// Rejects a non-numeric `retention.ms` the way a broker does.
    async fn alter_topic_config(
        &self,
        topic: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<(), AdminError> {
        self.cluster.enter("alter_topic_config")?;
        let bad_retention = updates
            .get("retention.ms")
            .map_or(false, |v| v.parse::<i64>().is_err());
        if bad_retention {
            return Err(AdminError::Kafka {
                error: ProtocolError::InvalidConfig,
                message: Some("Invalid value for configuration retention.ms".to_string()),
                context: topic.to_string(),
            });
        }

        self.cluster
            .configs
            .lock()
            .entry(topic.to_string())
            .or_default()
            .extend(updates);
        Ok(())
    }

    async fn close(&self) -> Result<(), AdminError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeConnector {
    cluster: Arc<FakeCluster>,
    refuse: AtomicBool,
    pub connects: AtomicUsize,
    admins: Mutex<Vec<Arc<FakeAdmin>>>,
}

impl FakeConnector {
    pub fn new(cluster: Arc<FakeCluster>) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            refuse: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            admins: Mutex::new(vec![]),
        })
    }

    /// Makes every following connect fail with a refused connection.
    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn last_admin(&self) -> Arc<FakeAdmin> {
        Arc::clone(self.admins.lock().last().expect("no admin opened"))
    }
}

#[async_trait]
impl AdminConnector for FakeConnector {
    async fn connect(&self, config: &AdminConfig) -> Result<Arc<dyn AdminClient>, AdminError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(AdminError::Unreachable {
                broker: config.bootstrap_servers.join(","),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            });
        }

        let admin = Arc::new(FakeAdmin {
            cluster: Arc::clone(&self.cluster),
            closed: AtomicUsize::new(0),
        });
        self.admins.lock().push(Arc::clone(&admin));
        Ok(admin)
    }
}

/// A disconnected manager over `cluster`.
pub fn manager(cluster: Arc<FakeCluster>) -> (ConnectionManager, Arc<FakeConnector>) {
    let connector = FakeConnector::new(cluster);
    let manager = ConnectionManager::new(
        Arc::clone(&connector) as Arc<dyn AdminConnector>,
        AdminConfig::new(vec![]),
    );
    (manager, connector)
}

/// A manager already connected to `cluster`.
pub async fn connected(cluster: Arc<FakeCluster>) -> Arc<ConnectionManager> {
    let (manager, _connector) = manager(cluster);
    manager
        .connect(vec!["localhost:9092".to_string()], None)
        .await
        .expect("fake cluster accepts connections");
    Arc::new(manager)
}
