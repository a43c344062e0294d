//! Client-side belief about the server connection.
//!
//! The belief is persisted so that a restarted console can pick it up again,
//! but it is only trusted after the server confirms it (see
//! [`ConnectionSync::restore`]).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    api::{ConsoleApi, Result},
    store::ConnectionStore,
};
use crate::{
    http::validation::ConnectRequest,
    service::model::{ClusterConnection, ConnectionStatus},
};

/// Progress of reconciling a persisted record with the server.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreState {
    NoRecord,
    PendingVerification(ClusterConnection),
    Verified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub cluster: Option<ClusterConnection>,
    pub is_connecting: bool,
    pub connection_error: Option<String>,
    pub restore: RestoreState,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.cluster
            .as_ref()
            .map_or(false, |c| c.status == ConnectionStatus::Connected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            cluster: None,
            is_connecting: false,
            connection_error: None,
            restore: RestoreState::NoRecord,
        }
    }
}

/// Shared connection state, observed through [`watch`] receivers.
#[derive(Debug)]
pub struct ConnectionSync {
    api: Arc<dyn ConsoleApi>,
    store: Arc<dyn ConnectionStore>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionSync {
    pub fn new(api: Arc<dyn ConsoleApi>, store: Arc<dyn ConnectionStore>) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self { api, store, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub async fn connect(&self, form: ConnectRequest) -> Result<ClusterConnection> {
        self.state.send_modify(|s| {
            s.is_connecting = true;
            s.connection_error = None;
            if let Some(cluster) = s.cluster.as_mut() {
                cluster.status = ConnectionStatus::Connecting;
            }
        });

        match self.api.connect(&form).await {
            Ok(cluster) => {
                info!(name = %cluster.name, "Connected");
                self.persist(&cluster);
                self.state.send_modify(|s| {
                    s.cluster = Some(cluster.clone());
                    s.is_connecting = false;
                    s.restore = RestoreState::Verified;
                });
                Ok(cluster)
            }
            Err(e) => {
                warn!(%e, "Connect failed");
                self.state.send_modify(|s| {
                    s.cluster = None;
                    s.is_connecting = false;
                    s.connection_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Forgets the connection locally even if the server call fails.
    pub async fn disconnect(&self) {
        if let Err(e) = self.api.disconnect().await {
            warn!(%e, "Server disconnect failed");
        }
        self.forget();
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.connection_error = None);
    }

    /// Reconciles the persisted record with the server.
    ///
    /// A record becomes the current connection only if the server reports an
    /// active connection; the server's bootstrap servers then replace the
    /// persisted ones. Otherwise the stale record is deleted.
    pub async fn restore(&self) -> RestoreState {
        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No persisted connection");
                self.state.send_modify(|s| s.restore = RestoreState::NoRecord);
                return RestoreState::NoRecord;
            }
            Err(e) => {
                warn!(%e, "Discarding unreadable persisted connection");
                self.forget();
                return RestoreState::NoRecord;
            }
        };

        self.state
            .send_modify(|s| s.restore = RestoreState::PendingVerification(record.clone()));

        let info = match self.api.status().await {
            Ok(status) if status.is_connected => status.connection_info,
            Ok(_) => {
                info!(name = %record.name, "Server has no connection, dropping persisted one");
                self.forget();
                return RestoreState::NoRecord;
            }
            Err(e) => {
                warn!(%e, "Cannot verify persisted connection");
                self.forget();
                return RestoreState::NoRecord;
            }
        };

        let mut cluster = record;
        cluster.status = ConnectionStatus::Connected;
        if let Some(info) = info {
            cluster.bootstrap_servers = info
                .bootstrap_servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self.persist(&cluster);
        self.state.send_modify(|s| {
            s.cluster = Some(cluster);
            s.restore = RestoreState::Verified;
        });
        RestoreState::Verified
    }

    fn persist(&self, cluster: &ClusterConnection) {
        if let Err(e) = self.store.save(cluster) {
            warn!(%e, "Cannot persist connection");
        }
    }

    fn forget(&self) {
        if let Err(e) = self.store.clear() {
            warn!(%e, "Cannot clear persisted connection");
        }
        self.state.send_modify(|s| {
            s.cluster = None;
            s.is_connecting = false;
            s.restore = RestoreState::NoRecord;
        });
    }
}
