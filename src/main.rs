use std::sync::Arc;

use clap::Parser;
use kafka_console::{
    admin::WireConnector,
    config::Args,
    http::{self, AppState},
    service::{ConnectionManager, MetadataAggregator, SimulatedMetrics, TopicCommands},
};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kafka_console={0},tower_http={0}", args.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(args).await {
        error!(%e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let connections = Arc::new(ConnectionManager::new(
        Arc::new(WireConnector),
        args.admin_config(),
    ));
    connections
        .initialize(&args.bootstrap_servers(), Some(args.client_id.clone()))
        .await;

    let state = AppState::new(
        Arc::clone(&connections),
        MetadataAggregator::new(
            Arc::clone(&connections),
            args.sampling(),
            Arc::new(SimulatedMetrics::new()),
        ),
        TopicCommands::new(Arc::clone(&connections)),
    );

    let listener = TcpListener::bind(args.listen_addr()?).await?;
    http::serve(listener, http::router(state), shutdown_signal()).await?;

    info!("Shutting down");
    connections.disconnect().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "Cannot listen for shutdown signal");
    }
}
