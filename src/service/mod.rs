//! The console's view of a cluster: one managed connection, read-side
//! aggregation and validated topic commands.

pub mod aggregator;
pub mod commands;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod model;
pub mod sampling;

pub use aggregator::MetadataAggregator;
pub use commands::{validate_topic_name, CreateTopic, TopicCommands};
pub use connection::ConnectionManager;
pub use error::{ConnectErrorKind, ServiceError, TopicCommandError};
pub use metrics::{MetricsProvider, SimulatedMetrics};
pub use sampling::SamplingStrategy;
