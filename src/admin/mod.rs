//! The administrative operations the console needs from a cluster.
//!
//! [`AdminClient`] is the seam between the service layer and the wire client:
//! [`WireConnector`] opens real connections, tests plug in fakes.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    backoff::{BackoffConfig, BackoffError},
    client::{
        error::{Error as ClientError, ProtocolError, RequestError},
        ClusterDescription, DEFAULT_CLIENT_ID,
    },
    connection,
    topic::Topic,
};

mod wire;
pub use wire::{WireAdmin, WireConnector};

/// Everything needed to open an admin connection.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminConfig {
    pub bootstrap_servers: Vec<String>,
    pub client_id: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: BackoffConfig,
}

impl AdminConfig {
    pub fn new(bootstrap_servers: Vec<String>) -> Self {
        Self {
            bootstrap_servers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            retry: BackoffConfig::default(),
        }
    }
}

/// A topic to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub configs: BTreeMap<String, String>,

    /// How long the controller may take to create the topic on all replicas.
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("cannot reach broker {broker}: {source}")]
    Unreachable {
        broker: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Timeout(String),

    #[error("{}", .message.clone().unwrap_or_else(|| .error.to_string()))]
    Kafka {
        error: ProtocolError,
        message: Option<String>,
        context: String,
    },

    #[error("admin client is closed")]
    Closed,

    #[error(transparent)]
    Client(ClientError),
}

impl AdminError {
    /// Protocol error code returned by the cluster, if any.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            Self::Kafka { error, .. } => Some(*error),
            _ => None,
        }
    }
}

impl From<ClientError> for AdminError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RetryFailed(BackoffError::DeadlineExceeded { deadline, source }) => {
                match source.downcast::<ClientError>() {
                    Ok(inner) => Self::from(*inner),
                    Err(source) => Self::Client(ClientError::RetryFailed(
                        BackoffError::DeadlineExceeded { deadline, source },
                    )),
                }
            }
            ClientError::Connection(connection::Error::Transport { broker, source }) => {
                Self::Unreachable { broker, source }
            }
            ClientError::Connection(e @ connection::Error::Timeout { .. }) => {
                Self::Timeout(e.to_string())
            }
            ClientError::Request(e @ RequestError::Timeout { .. })
            | ClientError::Connection(connection::Error::Metadata(e @ RequestError::Timeout { .. })) => {
                Self::Timeout(e.to_string())
            }
            ClientError::ServerError {
                protocol_error,
                error_message,
                request,
            } => Self::Kafka {
                error: protocol_error,
                message: error_message,
                context: request.to_string(),
            },
            other => Self::Client(other),
        }
    }
}

/// Administrative operations on one connected cluster.
#[async_trait]
pub trait AdminClient: Debug + Send + Sync {
    /// Cluster id, controller and live brokers.
    async fn describe_cluster(&self) -> Result<ClusterDescription, AdminError>;

    /// Names of all non-internal topics.
    async fn list_topics(&self) -> Result<Vec<String>, AdminError>;

    /// Partition layout of the named topics.
    async fn fetch_topic_metadata(&self, topics: &[String]) -> Result<Vec<Topic>, AdminError>;

    /// Configuration values of a topic, keyed by name.
    async fn describe_topic_config(&self, topic: &str)
        -> Result<BTreeMap<String, String>, AdminError>;

    async fn create_topic(&self, topic: NewTopic) -> Result<(), AdminError>;

    async fn delete_topic(&self, topic: &str, timeout: Duration) -> Result<(), AdminError>;

    /// Sets the given keys, leaving other dynamic configuration untouched.
    async fn alter_topic_config(
        &self,
        topic: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<(), AdminError>;

    /// Releases the connection. The client must not be used afterwards.
    async fn close(&self) -> Result<(), AdminError>;
}

/// Opens [`AdminClient`]s.
#[async_trait]
pub trait AdminConnector: Send + Sync {
    async fn connect(&self, config: &AdminConfig) -> Result<Arc<dyn AdminClient>, AdminError>;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::client::error::RequestContext;

    #[test]
    fn retried_refusal_unwraps_to_unreachable() {
        let refused = ClientError::Connection(connection::Error::Transport {
            broker: "localhost:9092".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        });
        let err = ClientError::RetryFailed(BackoffError::DeadlineExceeded {
            deadline: Duration::from_secs(1),
            source: Box::new(refused),
        });

        assert_matches!(
            AdminError::from(err),
            AdminError::Unreachable { source, .. } if source.kind() == std::io::ErrorKind::ConnectionRefused
        );
    }

    #[test]
    fn server_error_keeps_kafka_message() {
        let err = AdminError::from(ClientError::ServerError {
            protocol_error: ProtocolError::InvalidConfig,
            error_message: Some("Invalid value abc for configuration retention.ms".to_string()),
            request: RequestContext::Topic("t".to_string()),
        });

        assert_eq!(err.protocol_error(), Some(ProtocolError::InvalidConfig));
        assert_eq!(
            err.to_string(),
            "Invalid value abc for configuration retention.ms"
        );
    }

    #[test]
    fn server_error_without_message_uses_code_text() {
        let err = AdminError::from(ClientError::ServerError {
            protocol_error: ProtocolError::TopicAlreadyExists,
            error_message: None,
            request: RequestContext::Topic("t".to_string()),
        });
        assert_eq!(err.to_string(), "Topic with this name already exists.");
    }
}
