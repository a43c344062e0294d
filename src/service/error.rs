use thiserror::Error;

use crate::admin::AdminError;
use crate::client::error::ProtocolError;

/// Why a connection attempt failed, as told to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    ConnectionRefused,
    Timeout,
    CoordinatorUnavailable,
    BrokerUnavailable,
    Unclassified,
}

impl ConnectErrorKind {
    pub fn classify(err: &AdminError) -> Self {
        match err {
            AdminError::Unreachable { source, .. } => match source.kind() {
                std::io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
                std::io::ErrorKind::TimedOut => Self::Timeout,
                _ => Self::Unclassified,
            },
            AdminError::Timeout(_) => Self::Timeout,
            AdminError::Kafka { error, .. } => match error {
                ProtocolError::CoordinatorNotAvailable
                | ProtocolError::CoordinatorLoadInProgress
                | ProtocolError::NotCoordinator => Self::CoordinatorUnavailable,
                ProtocolError::BrokerNotAvailable | ProtocolError::LeaderNotAvailable => {
                    Self::BrokerUnavailable
                }
                _ => Self::Unclassified,
            },
            AdminError::Closed | AdminError::Client(_) => Self::Unclassified,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => {
                "Connection refused. Please check if Kafka brokers are running and accessible."
            }
            Self::Timeout => {
                "Connection timeout. Please check network connectivity and broker addresses."
            }
            Self::CoordinatorUnavailable => {
                "Kafka coordinator not available. Please wait and try again."
            }
            Self::BrokerUnavailable => "Kafka broker not available. Please check broker status.",
            Self::Unclassified => "Failed to connect to Kafka cluster",
        }
    }
}

/// Rejections of topic commands.
#[derive(Debug, Error)]
pub enum TopicCommandError {
    #[error("Topic name is required")]
    EmptyName,

    #[error("Topic name must be 249 characters or less")]
    NameTooLong { len: usize },

    #[error("Topic name can only contain letters, numbers, dots, underscores, and hyphens")]
    InvalidCharacters,

    #[error("Topic \"{name}\" already exists")]
    AlreadyExists { name: String },

    #[error("Topic \"{name}\" does not exist")]
    NotFound { name: String },

    #[error(
        "Replication factor {requested} cannot exceed the number of available brokers ({brokers})"
    )]
    ReplicationFactorTooHigh { requested: i16, brokers: usize },

    #[error("{source}")]
    Rejected { name: String, source: AdminError },
}

impl TopicCommandError {
    /// True for malformed input, as opposed to rules of the cluster.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyName | Self::NameTooLong { .. } | Self::InvalidCharacters
        )
    }

    /// The topic the rejection is about.
    pub fn topic_name(&self) -> Option<&str> {
        match self {
            Self::AlreadyExists { name } | Self::NotFound { name } | Self::Rejected { name, .. } => {
                Some(name.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not connected to Kafka cluster")]
    NotConnected,

    #[error("{}", connect_message(.kind, .source))]
    Connect {
        kind: ConnectErrorKind,
        source: AdminError,
    },

    #[error(transparent)]
    Topic(#[from] TopicCommandError),

    #[error("{context}: {source}")]
    Kafka {
        context: &'static str,
        source: AdminError,
    },
}

fn connect_message(kind: &ConnectErrorKind, source: &AdminError) -> String {
    match kind {
        ConnectErrorKind::Unclassified => format!("{}: {source}", kind.message()),
        _ => kind.message().to_string(),
    }
}

impl ServiceError {
    pub(crate) fn connect(source: AdminError) -> Self {
        Self::Connect {
            kind: ConnectErrorKind::classify(&source),
            source,
        }
    }

    /// Wraps a failed cluster read with a readable prefix.
    pub(crate) fn kafka(context: &'static str) -> impl FnOnce(AdminError) -> Self {
        move |source| Self::Kafka { context, source }
    }

    /// Wraps a failed topic mutation. Only an error the cluster answered with
    /// is a rejection; transport failures stay [`ServiceError::Kafka`].
    pub(crate) fn rejected(name: &str, context: &'static str) -> impl FnOnce(AdminError) -> Self {
        let name = name.to_string();
        move |source| match source {
            AdminError::Kafka { .. } => TopicCommandError::Rejected { name, source }.into(),
            source => Self::Kafka { context, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_refused() {
        let err = AdminError::Unreachable {
            broker: "localhost:9092".to_string(),
            source: std::io::ErrorKind::ConnectionRefused.into(),
        };
        let err = ServiceError::connect(err);
        assert!(err.to_string().starts_with("Connection refused."));
    }

    #[test]
    fn classify_protocol_errors() {
        let kafka = |error| AdminError::Kafka {
            error,
            message: None,
            context: "cluster".to_string(),
        };

        assert_eq!(
            ConnectErrorKind::classify(&kafka(ProtocolError::CoordinatorNotAvailable)),
            ConnectErrorKind::CoordinatorUnavailable
        );
        assert_eq!(
            ConnectErrorKind::classify(&kafka(ProtocolError::BrokerNotAvailable)),
            ConnectErrorKind::BrokerUnavailable
        );
        assert_eq!(
            ConnectErrorKind::classify(&AdminError::Timeout("slow".to_string())),
            ConnectErrorKind::Timeout
        );
    }

    #[test]
    fn only_cluster_answers_are_rejections() {
        let invalid = AdminError::Kafka {
            error: ProtocolError::InvalidConfig,
            message: None,
            context: "orders".to_string(),
        };
        let rejected = ServiceError::rejected("orders", "Failed to create topic")(invalid);
        assert!(matches!(
            rejected,
            ServiceError::Topic(TopicCommandError::Rejected { .. })
        ));

        let lost = ServiceError::rejected("orders", "Failed to create topic")(AdminError::Closed);
        assert!(matches!(
            lost,
            ServiceError::Kafka {
                context: "Failed to create topic",
                source: AdminError::Closed
            }
        ));
    }

    #[test]
    fn unclassified_keeps_detail() {
        let err = ServiceError::connect(AdminError::Kafka {
            error: ProtocolError::ClusterAuthorizationFailed,
            message: None,
            context: "cluster".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Failed to connect to Kafka cluster: Cluster authorization failed."
        );
    }
}
