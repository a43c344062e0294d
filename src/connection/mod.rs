//! Broker connections and the arbitrary-broker cache.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::prelude::*;
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex};
use tracing::{debug, info, warn};

use crate::messenger::{Messenger, RequestError, SyncVersionsError};
use crate::protocol::messages::{MetadataRequest, MetadataResponse};

mod topology;
pub use topology::{Broker, BrokerTopology};

/// A connection to a broker.
pub type MessengerTransport = Messenger<TcpStream>;

pub type BrokerConnection = Arc<MessengerTransport>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("error getting cluster metadata: {0}")]
    Metadata(#[from] RequestError),

    #[error("error connecting to broker \"{broker}\": {source}")]
    Transport {
        broker: String,
        source: std::io::Error,
    },

    #[error("timed out connecting to broker \"{broker}\" after {timeout:?}")]
    Timeout { broker: String, timeout: Duration },

    #[error("cannot sync versions with broker \"{broker}\": {source}")]
    SyncVersions {
        broker: String,
        source: SyncVersionsError,
    },

    #[error("no brokers to connect to")]
    NoBrokers,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Tracks replacements of a cached broker connection.
///
/// Invalidation requests carrying an older generation are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerCacheGeneration(usize);

impl BrokerCacheGeneration {
    pub const START: Self = Self(0);

    pub fn get(&self) -> usize {
        self.0
    }

    pub(crate) fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Caches a broker connection, handing out a new one after invalidation.
#[async_trait]
pub trait BrokerCache: Send + Sync {
    type R: Send + Sync;
    type E: std::error::Error + Send + Sync;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E>;

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration);
}

/// Limits applied to every broker connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_message_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Opens connections to the brokers of one cluster.
///
/// Bootstrap brokers are only used until the first metadata response is in,
/// afterwards the advertised broker addresses are used.
#[derive(Debug)]
pub struct BrokerConnector {
    /// Broker URLs used to bootstrap this pool
    bootstrap_brokers: Vec<String>,

    client_id: Arc<str>,

    config: ConnectionConfig,

    /// Discovered brokers in the cluster, including bootstrap brokers
    pub(crate) topology: BrokerTopology,

    /// The cached arbitrary broker.
    ///
    /// This one is used for metadata queries.
    cached_arbitrary_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

impl BrokerConnector {
    pub fn new(bootstrap_brokers: Vec<String>, client_id: Arc<str>, config: ConnectionConfig) -> Self {
        Self {
            bootstrap_brokers,
            client_id,
            config,
            topology: Default::default(),
            cached_arbitrary_broker: Mutex::new((None, BrokerCacheGeneration::START)),
        }
    }

    /// Fetches fresh cluster metadata and updates the known brokers.
    pub async fn refresh_metadata(&self) -> Result<MetadataResponse> {
        self.request_metadata(None).await
    }

    /// Requests metadata from an arbitrary broker.
    ///
    /// `None` asks for every topic. A broken connection is dropped from the
    /// cache so the next call reconnects.
    pub async fn request_metadata(&self, topics: Option<Vec<String>>) -> Result<MetadataResponse> {
        let (broker, gen) = BrokerCache::get(&self).await?;

        let request = match topics {
            Some(names) => MetadataRequest::for_topics(names),
            None => MetadataRequest {
                topics: None,
                allow_auto_topic_creation: Some(false),
            },
        };

        let response = match broker.request(request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_broken_connection() {
                    BrokerCache::invalidate(&self, "metadata request failed", gen).await;
                }
                return Err(Error::Metadata(e));
            }
        };

        self.topology.update(&response.brokers);
        Ok(response)
    }

    /// Returns a new connection to the broker with the provided id, `None` if
    /// the broker is not in the known topology.
    pub async fn connect(&self, broker_id: i32) -> Result<Option<BrokerConnection>> {
        match self.topology.get_broker(broker_id) {
            Some(broker) => self.connect_to(&broker.to_string()).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drops the cached connection. Later requests reconnect on demand.
    pub async fn close(&self) {
        let mut guard = self.cached_arbitrary_broker.lock().await;
        if guard.0.take().is_some() {
            guard.1.bump();
            debug!("Closed arbitrary broker connection");
        }
    }

    async fn connect_to(&self, addr: &str) -> Result<BrokerConnection> {
        let stream = match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(Error::Transport {
                    broker: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(Error::Timeout {
                    broker: addr.to_string(),
                    timeout: self.config.connect_timeout,
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(%e, broker = addr, "Cannot set TCP_NODELAY");
        }

        let messenger = Messenger::new(
            stream,
            self.config.max_message_size,
            Arc::clone(&self.client_id),
            self.config.request_timeout,
        );
        messenger
            .sync_versions()
            .await
            .map_err(|source| Error::SyncVersions {
                broker: addr.to_string(),
                source,
            })?;

        Ok(Arc::new(messenger))
    }

    /// Tries the known brokers in random order, returning the first that
    /// accepts a connection or the last error.
    async fn connect_any(&self) -> Result<BrokerConnection> {
        let mut addrs: Vec<String> = if self.topology.is_empty() {
            self.bootstrap_brokers.clone()
        } else {
            self.topology
                .get_brokers()
                .iter()
                .map(ToString::to_string)
                .collect()
        };
        addrs.shuffle(&mut thread_rng());

        let mut last_error = Error::NoBrokers;
        for addr in addrs {
            match self.connect_to(&addr).await {
                Ok(broker) => return Ok(broker),
                Err(e) => {
                    warn!(%e, broker = %addr, "Failed to connect to broker");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Caches an arbitrary broker that can successfully connect.
#[async_trait]
impl<'a> BrokerCache for &'a BrokerConnector {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        let mut current_broker = self.cached_arbitrary_broker.lock().await;
        if let Some(broker) = &current_broker.0 {
            return Ok((Arc::clone(broker), current_broker.1));
        }

        let connection = self.connect_any().await?;
        info!("Created new arbitrary broker connection");

        current_broker.0 = Some(Arc::clone(&connection));
        current_broker.1.bump();

        Ok((connection, current_broker.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.cached_arbitrary_broker.lock().await;

        if guard.1 != gen {
            // stale request
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
                "stale invalidation request for arbitrary broker cache",
            );
            return;
        }

        info!(reason, "Invalidating cached arbitrary broker");
        guard.0.take();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn generation_bumps() {
        let mut gen = BrokerCacheGeneration::START;
        gen.bump();
        assert_eq!(gen.get(), 1);
        assert_ne!(gen, BrokerCacheGeneration::START);
    }

    #[tokio::test]
    async fn no_bootstrap_brokers() {
        let connector = BrokerConnector::new(vec![], Arc::from("test"), Default::default());
        let err = connector.refresh_metadata().await.unwrap_err();
        assert_matches!(err, Error::NoBrokers);
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = BrokerConnector::new(vec![addr], Arc::from("test"), Default::default());
        let err = connector.refresh_metadata().await.unwrap_err();
        assert_matches!(
            err,
            Error::Transport { source, .. } if source.kind() == std::io::ErrorKind::ConnectionRefused
        );
    }

    #[tokio::test]
    async fn unknown_broker_id() {
        let connector = BrokerConnector::new(vec![], Arc::from("test"), Default::default());
        assert!(connector.connect(42).await.unwrap().is_none());
    }
}
