//! Error codes carried inside protocol responses.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    #[error("The server experienced an unexpected error when processing the request.")]
    UnknownServerError,

    #[error("This server does not host this topic-partition.")]
    UnknownTopicOrPartition,

    #[error("There is no leader for this topic-partition as we are in the middle of a leadership election.")]
    LeaderNotAvailable,

    #[error("For requests intended only for the leader, this error indicates that the broker is not the current leader.")]
    NotLeaderOrFollower,

    #[error("The request timed out.")]
    RequestTimedOut,

    #[error("The broker is not available.")]
    BrokerNotAvailable,

    #[error("The coordinator is loading and hence can't process requests.")]
    CoordinatorLoadInProgress,

    #[error("The coordinator is not available.")]
    CoordinatorNotAvailable,

    #[error("This is not the correct coordinator.")]
    NotCoordinator,

    #[error("The request attempted to perform an operation on an invalid topic.")]
    InvalidTopicException,

    #[error("Messages are rejected since there are fewer in-sync replicas than required.")]
    NotEnoughReplicas,

    #[error("Topic authorization failed.")]
    TopicAuthorizationFailed,

    #[error("Cluster authorization failed.")]
    ClusterAuthorizationFailed,

    #[error("The version of API is not supported.")]
    UnsupportedVersion,

    #[error("Topic with this name already exists.")]
    TopicAlreadyExists,

    #[error("Number of partitions is below 1.")]
    InvalidPartitions,

    #[error("Replication factor is below 1 or larger than the number of available brokers.")]
    InvalidReplicationFactor,

    #[error("Replica assignment is invalid.")]
    InvalidReplicaAssignment,

    #[error("Configuration is invalid.")]
    InvalidConfig,

    #[error("This is not the correct controller for this cluster.")]
    NotController,

    #[error("This most likely occurs because of a request being malformed by the client library or the message was sent to an incompatible broker.")]
    InvalidRequest,

    #[error("Request parameters do not satisfy the configured policy.")]
    PolicyViolation,

    #[error("Topic deletion is disabled.")]
    TopicDeletionDisabled,

    #[error("Unknown error code {0}")]
    Unknown(i16),
}

impl Error {
    /// Maps a response error code, `0` meaning "no error".
    pub fn new(code: i16) -> Option<Self> {
        let err = match code {
            0 => return None,
            -1 => Self::UnknownServerError,
            3 => Self::UnknownTopicOrPartition,
            5 => Self::LeaderNotAvailable,
            6 => Self::NotLeaderOrFollower,
            7 => Self::RequestTimedOut,
            8 => Self::BrokerNotAvailable,
            14 => Self::CoordinatorLoadInProgress,
            15 => Self::CoordinatorNotAvailable,
            16 => Self::NotCoordinator,
            17 => Self::InvalidTopicException,
            19 => Self::NotEnoughReplicas,
            29 => Self::TopicAuthorizationFailed,
            31 => Self::ClusterAuthorizationFailed,
            35 => Self::UnsupportedVersion,
            36 => Self::TopicAlreadyExists,
            37 => Self::InvalidPartitions,
            38 => Self::InvalidReplicationFactor,
            39 => Self::InvalidReplicaAssignment,
            40 => Self::InvalidConfig,
            41 => Self::NotController,
            42 => Self::InvalidRequest,
            44 => Self::PolicyViolation,
            73 => Self::TopicDeletionDisabled,
            other => Self::Unknown(other),
        };
        Some(err)
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::UnknownTopicOrPartition => 3,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderOrFollower => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::CoordinatorLoadInProgress => 14,
            Self::CoordinatorNotAvailable => 15,
            Self::NotCoordinator => 16,
            Self::InvalidTopicException => 17,
            Self::NotEnoughReplicas => 19,
            Self::TopicAuthorizationFailed => 29,
            Self::ClusterAuthorizationFailed => 31,
            Self::UnsupportedVersion => 35,
            Self::TopicAlreadyExists => 36,
            Self::InvalidPartitions => 37,
            Self::InvalidReplicationFactor => 38,
            Self::InvalidReplicaAssignment => 39,
            Self::InvalidConfig => 40,
            Self::NotController => 41,
            Self::InvalidRequest => 42,
            Self::PolicyViolation => 44,
            Self::TopicDeletionDisabled => 73,
            Self::Unknown(code) => *code,
        }
    }
}
