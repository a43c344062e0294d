//! JSON API over the console services.

use std::{future::Future, io, sync::Arc};

use axum::{
    routing::{get, patch},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::service::{ConnectionManager, MetadataAggregator, TopicCommands};

pub mod envelope;
pub mod handlers;
pub mod validation;

pub use envelope::{ApiError, Envelope};

/// Services shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub aggregator: Arc<MetadataAggregator>,
    pub commands: Arc<TopicCommands>,
}

impl AppState {
    pub fn new(
        connections: Arc<ConnectionManager>,
        aggregator: MetadataAggregator,
        commands: TopicCommands,
    ) -> Self {
        Self {
            connections,
            aggregator: Arc::new(aggregator),
            commands: Arc::new(commands),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/kafka/connect",
            get(handlers::connection_status)
                .post(handlers::connect)
                .delete(handlers::disconnect),
        )
        .route("/kafka/cluster", get(handlers::cluster_overview))
        .route("/kafka/brokers", get(handlers::brokers))
        .route(
            "/kafka/topics",
            get(handlers::topics)
                .post(handlers::create_topic)
                .delete(handlers::delete_topic),
        )
        .route("/kafka/topics/:name", get(handlers::topic_details))
        .route(
            "/kafka/topics/:name/config",
            patch(handlers::update_topic_config),
        )
        .route("/health", get(handlers::health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `router` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "HTTP API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
