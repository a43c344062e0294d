//! Ownership of the single live admin connection.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{error::ServiceError, model::ConnectionInfo};
use crate::admin::{AdminClient, AdminConfig, AdminConnector};

#[derive(Debug, Clone)]
struct Active {
    admin: Arc<dyn AdminClient>,
    info: ConnectionInfo,
}

/// Holds at most one open admin connection.
///
/// Connect and disconnect are serialized, reads never wait for them.
pub struct ConnectionManager {
    connector: Arc<dyn AdminConnector>,

    /// Timeouts and retry policy for new connections.
    template: AdminConfig,

    transition: Mutex<()>,

    active: RwLock<Option<Active>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("template", &self.template)
            .field("active", &self.active.read().as_ref().map(|a| &a.info))
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn AdminConnector>, template: AdminConfig) -> Self {
        Self {
            connector,
            template,
            transition: Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    /// Opens a connection, replacing any existing one.
    ///
    /// The new connection is verified with a cluster description before it
    /// becomes active; on failure it is closed again and no connection remains.
    pub async fn connect(
        &self,
        bootstrap_servers: Vec<String>,
        client_id: Option<String>,
    ) -> Result<ConnectionInfo, ServiceError> {
        let _transition = self.transition.lock().await;
        self.teardown().await;

        let config = AdminConfig {
            bootstrap_servers,
            client_id: client_id.unwrap_or_else(|| self.template.client_id.clone()),
            ..self.template.clone()
        };
        info!(
            brokers = ?config.bootstrap_servers,
            client_id = %config.client_id,
            "Connecting to Kafka cluster",
        );

        let admin = self
            .connector
            .connect(&config)
            .await
            .map_err(|e| {
                warn!(%e, "Failed to open admin connection");
                ServiceError::connect(e)
            })?;

        let cluster = match admin.describe_cluster().await {
            Ok(cluster) => cluster,
            Err(e) => {
                warn!(%e, "Connection verification failed");
                if let Err(close_err) = admin.close().await {
                    warn!(e = %close_err, "Failed to close unverified connection");
                }
                return Err(ServiceError::connect(e));
            }
        };

        let info = ConnectionInfo {
            bootstrap_servers: config.bootstrap_servers,
            client_id: config.client_id,
            connected_at: Utc::now(),
            cluster_id: cluster.cluster_id,
            controller_id: cluster.controller_id,
        };
        info!(
            cluster_id = ?info.cluster_id,
            brokers = cluster.brokers.len(),
            "Connected to Kafka cluster",
        );

        *self.active.write() = Some(Active {
            admin,
            info: info.clone(),
        });

        Ok(info)
    }

    /// Closes the current connection, if any.
    ///
    /// State is cleared even when closing fails.
    pub async fn disconnect(&self) {
        let _transition = self.transition.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        let previous = self.active.write().take();
        let Some(previous) = previous else {
            debug!("No active connection to tear down");
            return;
        };

        match previous.admin.close().await {
            Ok(()) => info!(
                brokers = ?previous.info.bootstrap_servers,
                "Disconnected from Kafka cluster",
            ),
            Err(e) => warn!(%e, "Error while closing admin connection"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.active.read().as_ref().map(|a| a.info.clone())
    }

    /// The live admin client, or [`ServiceError::NotConnected`].
    pub fn admin(&self) -> Result<Arc<dyn AdminClient>, ServiceError> {
        self.active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.admin))
            .ok_or(ServiceError::NotConnected)
    }

    /// Startup connection attempt from process configuration.
    ///
    /// Failures are logged and swallowed so that a manual connect stays possible.
    pub async fn initialize(&self, bootstrap_servers: &[String], client_id: Option<String>) {
        if bootstrap_servers.is_empty() {
            info!("No KAFKA_BROKERS configured, waiting for a manual connection");
            return;
        }

        match self.connect(bootstrap_servers.to_vec(), client_id).await {
            Ok(info) => info!(brokers = ?info.bootstrap_servers, "Startup connection established"),
            Err(e) => warn!(%e, "Startup connection failed, waiting for a manual connection"),
        }
    }
}
