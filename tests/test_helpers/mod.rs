#![allow(dead_code)]

use std::sync::Arc;

use kafka_console::{
    admin::{AdminConfig, AdminConnector},
    http::{self, AppState},
    service::{ConnectionManager, MetadataAggregator, SimulatedMetrics, TopicCommands},
};
use tokio::net::TcpListener;

pub use kafka_console::testing::{FakeCluster, FakeConnector, FakeFailure};

/// Skips the test unless `TEST_INTEGRATION` and `KAFKA_CONNECT` are set.
#[macro_export]
macro_rules! maybe_skip_kafka_integration {
    () => {{
        use std::env;
        dotenvy::dotenv().ok();

        match (
            env::var("TEST_INTEGRATION").is_ok(),
            env::var("KAFKA_CONNECT").ok(),
        ) {
            (true, Some(kafka_connection)) => {
                let bootstrap_brokers: Vec<String> = kafka_connection
                    .split(',')
                    .map(|s| s.trim().to_owned())
                    .collect();
                $crate::test_helpers::TestConfig { bootstrap_brokers }
            }
            (true, None) => {
                panic!(
                    "TEST_INTEGRATION is set which requires running integration tests, but \
                    KAFKA_CONNECT is not set. Please run Kafka, then set KAFKA_CONNECT as \
                    directed in README.md."
                )
            }
            (false, Some(_)) => {
                eprintln!("skipping Kafka integration tests - set TEST_INTEGRATION to run");
                return;
            }
            (false, None) => {
                eprintln!(
                    "skipping Kafka integration tests - set TEST_INTEGRATION and KAFKA_CONNECT to \
                    run"
                );
                return;
            }
        }
    }};
}

#[derive(Debug, Clone)]
pub struct TestConfig {
    pub bootstrap_brokers: Vec<String>,
}

/// Starts logging if `RUST_LOG` is set.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").map_or(false, |v| !v.is_empty()) {
        start_logging()
    }
}

pub fn start_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn random_topic_name() -> String {
    format!("test_topic_{}", uuid::Uuid::new_v4().simple())
}

/// A running API server.
pub struct TestServer {
    pub base_url: String,
    pub connections: Arc<ConnectionManager>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(connector: Arc<dyn AdminConnector>) -> Self {
        let connections = Arc::new(ConnectionManager::new(connector, AdminConfig::new(vec![])));
        let state = AppState::new(
            Arc::clone(&connections),
            MetadataAggregator::new(
                Arc::clone(&connections),
                Default::default(),
                Arc::new(SimulatedMetrics::with_seed(7)),
            ),
            TopicCommands::new(Arc::clone(&connections)),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(http::serve(listener, http::router(state), async move {
            rx.await.ok();
        }));

        Self {
            base_url,
            connections,
            shutdown: Some(tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
    }
}
