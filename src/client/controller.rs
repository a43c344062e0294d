use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::error::{ProtocolError, RequestContext};
use crate::backoff::{Backoff, BackoffConfig, ErrorOrThrottle};
use crate::client::error::{Error, Result};
use crate::connection::{
    BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector, MessengerTransport,
};
use crate::protocol::messages::{
    AlterConfigsRequest, AlterConfigsResource, AlterableConfig, CreateTopicConfig,
    CreateTopicRequest, CreateTopicsRequest, DeleteTopicsRequest, RESOURCE_TYPE_TOPIC,
};

/// Sends cluster mutations to the controller broker.
#[derive(Debug)]
pub struct ControllerClient {
    brokers: Arc<BrokerConnector>,

    backoff_config: Arc<BackoffConfig>,

    /// Current broker connection if any
    current_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

impl ControllerClient {
    pub(super) fn new(brokers: Arc<BrokerConnector>, backoff_config: Arc<BackoffConfig>) -> Self {
        Self {
            brokers,
            backoff_config,
            current_broker: Mutex::new((None, BrokerCacheGeneration::START)),
        }
    }

    /// Create a topic
    ///
    /// `timeout_ms` is how long the controller waits for the topic to be
    /// created on every replica before answering.
    pub async fn create_topic(
        &self,
        name: impl Into<String> + Send,
        num_partitions: i32,
        replication_factor: i16,
        configs: BTreeMap<String, String>,
        timeout_ms: i32,
    ) -> Result<()> {
        let request = &CreateTopicsRequest {
            topics: vec![CreateTopicRequest {
                name: name.into(),
                num_partitions,
                replication_factor,
                assignments: vec![],
                configs: configs
                    .into_iter()
                    .map(|(name, value)| CreateTopicConfig {
                        name,
                        value: Some(value),
                    })
                    .collect(),
            }],
            timeout_ms,
            validate_only: None,
        };

        maybe_retry(&self.backoff_config, self, "create_topic", || async move {
            let (broker, g) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(g))))?;

            ErrorOrThrottle::check_throttle(response.throttle_time_ms)?;

            let topic = exactly_one(response.topics)
                .map_err(|e| ErrorOrThrottle::Error((e, Some(g))))?;

            match topic.error {
                None => Ok(()),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::server(
                        protocol_error,
                        topic.error_message,
                        RequestContext::Topic(topic.name),
                    ),
                    Some(g),
                ))),
            }
        })
        .await?;

        // Refresh the cache now there is definitely a new topic to observe.
        let _ = self.brokers.refresh_metadata().await;

        Ok(())
    }

    /// Delete a topic
    pub async fn delete_topic(&self, name: impl Into<String> + Send, timeout_ms: i32) -> Result<()> {
        let request = &DeleteTopicsRequest {
            topic_names: vec![name.into()],
            timeout_ms,
        };

        maybe_retry(&self.backoff_config, self, "delete_topic", || async move {
            let (broker, g) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(g))))?;

            ErrorOrThrottle::check_throttle(response.throttle_time_ms)?;

            let topic = exactly_one(response.responses)
                .map_err(|e| ErrorOrThrottle::Error((e, Some(g))))?;

            match topic.error {
                None => Ok(()),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::server(protocol_error, None, RequestContext::Topic(topic.name)),
                    Some(g),
                ))),
            }
        })
        .await?;

        let _ = self.brokers.refresh_metadata().await;

        Ok(())
    }

    /// Replaces the dynamic configuration of a topic with `configs`.
    ///
    /// Keys not listed fall back to their defaults.
    pub async fn alter_topic_config(
        &self,
        name: impl Into<String> + Send,
        configs: BTreeMap<String, String>,
    ) -> Result<()> {
        let request = &AlterConfigsRequest {
            resources: vec![AlterConfigsResource {
                resource_type: RESOURCE_TYPE_TOPIC,
                resource_name: name.into(),
                configs: configs
                    .into_iter()
                    .map(|(name, value)| AlterableConfig {
                        name,
                        value: Some(value),
                    })
                    .collect(),
            }],
            validate_only: false,
        };

        maybe_retry(&self.backoff_config, self, "alter_configs", || async move {
            let (broker, g) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(g))))?;

            ErrorOrThrottle::check_throttle(Some(response.throttle_time_ms))?;

            let resource = exactly_one(response.responses)
                .map_err(|e| ErrorOrThrottle::Error((e, Some(g))))?;

            match resource.error {
                None => Ok(()),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::server(
                        protocol_error,
                        resource.error_message,
                        RequestContext::Topic(resource.resource_name),
                    ),
                    Some(g),
                ))),
            }
        })
        .await
    }

    /// Retrieve the broker ID of the controller
    async fn get_controller_id(&self) -> Result<i32> {
        // Request an uncached, fresh copy of the metadata.
        let metadata = self.brokers.request_metadata(Some(vec![])).await?;

        let controller_id = metadata
            .controller_id
            .ok_or_else(|| Error::InvalidResponse("Leader is NULL".to_owned()))?;

        Ok(controller_id)
    }
}

fn exactly_one<T>(items: Vec<T>) -> Result<T> {
    let got = items.len();
    match <[T; 1]>::try_from(items) {
        Ok([item]) => Ok(item),
        Err(_) => Err(Error::exactly_one_topic(got)),
    }
}

/// Caches the cluster controller broker.
#[async_trait]
impl<'a> BrokerCache for &'a ControllerClient {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        let mut current_broker = self.current_broker.lock().await;
        if let Some(broker) = &current_broker.0 {
            return Ok((Arc::clone(broker), current_broker.1));
        }

        info!("Creating new controller broker connection",);

        let controller_id = self.get_controller_id().await?;
        let broker = self.brokers.connect(controller_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "Controller {controller_id} not found in metadata response",
            ))
        })?;

        current_broker.0 = Some(Arc::clone(&broker));
        current_broker.1.bump();

        Ok((broker, current_broker.1))
    }

    async fn invalidate(&self, reason: &'static str, g: BrokerCacheGeneration) {
        let mut guard = self.current_broker.lock().await;

        if guard.1 != g {
            // stale request
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = g.get(),
                "stale invalidation request for controller cache",
            );
            return;
        }

        info!(reason, "Invalidating cached controller broker");
        guard.0.take();
    }
}

/// Takes a `request_name` and a function yielding a fallible future
/// and handles certain classes of error
pub async fn maybe_retry<B, R, F, T>(
    backoff_config: &BackoffConfig,
    broker_cache: B,
    request_name: &str,
    f: R,
) -> Result<T>
where
    B: BrokerCache,
    R: (Fn() -> F) + Send + Sync,
    F: std::future::Future<
            Output = Result<T, ErrorOrThrottle<(Error, Option<BrokerCacheGeneration>)>>,
        > + Send,
{
    let mut backoff = Backoff::new(backoff_config);

    backoff
        .retry_with_backoff(request_name, || async {
            let (error, cache_gen) = match f().await {
                Ok(v) => {
                    return ControlFlow::Break(Ok(v));
                }
                Err(ErrorOrThrottle::Throttle(t)) => {
                    return ControlFlow::Continue(ErrorOrThrottle::Throttle(t));
                }
                Err(ErrorOrThrottle::Error(e)) => e,
            };

            match &error {
                // broken connection
                Error::Request(e) if e.is_broken_connection() => {
                    if let Some(cache_gen) = cache_gen {
                        broker_cache
                            .invalidate("connection broken", cache_gen)
                            .await
                    }
                }
                Error::Connection(_) => {
                    if let Some(cache_gen) = cache_gen {
                        broker_cache
                            .invalidate("connection broken", cache_gen)
                            .await
                    }
                }

                // our broker is actually not the controller
                Error::ServerError {
                    protocol_error: ProtocolError::NotController,
                    ..
                } => {
                    if let Some(cache_gen) = cache_gen {
                        broker_cache
                            .invalidate("server error: not controller", cache_gen)
                            .await;
                    }
                }

                // the cluster is still settling
                Error::ServerError {
                    protocol_error:
                        ProtocolError::LeaderNotAvailable
                        | ProtocolError::BrokerNotAvailable
                        | ProtocolError::CoordinatorLoadInProgress,
                    ..
                } => {}

                // fatal
                _ => {
                    error!(
                        e=%error,
                        request_name,
                        "request encountered fatal error",
                    );
                    return ControlFlow::Break(Err(error));
                }
            }
            ControlFlow::Continue(ErrorOrThrottle::Error(error))
        })
        .await
        .map_err(Error::RetryFailed)?
}
